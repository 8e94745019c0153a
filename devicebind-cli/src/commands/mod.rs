//! Subcommand implementations.

pub mod inspect;
pub mod pull;
pub mod push;
pub mod validate;
