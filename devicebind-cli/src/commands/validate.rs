//! Validate command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use devicebind_core::{ChallengeToken, EngineConfig};
use tracing::info;

use crate::utils::{build_resolver, print_challenge, read_token};
use crate::KeySource;

/// Parse a challenge with full validation against the given keys.
pub async fn execute(input: String, keys: KeySource, quiet: bool) -> Result<()> {
    let raw = read_token(&input)?;
    let resolver = build_resolver(&keys)?;
    let validation = EngineConfig::from_env().token_validation();

    let token = ChallengeToken::parse(&raw, &validation, resolver.as_ref())
        .await
        .context("Challenge validation failed")?;

    info!(transaction_id = %token.transaction_id(), "Challenge is valid");

    if !quiet {
        println!();
        println!("{}", "VALID CHALLENGE".green().bold());
        println!();
        print_challenge(&token);
    }
    Ok(())
}
