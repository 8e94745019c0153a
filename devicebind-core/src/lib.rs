//! DeviceBind Core - challenge-response verification for device-bound authenticators
//!
//! This crate answers server-issued authentication challenges with keys bound
//! to an enrolled device.
//!
//! # Features
//!
//! - Challenge token parsing and validation (JWS, `kid`-resolved issuer keys)
//! - Key selection from the challenge's user-verification policy, with a
//!   fallback cascade from biometric keys to proof of possession
//! - Interactive remediation steps (account selection, consent, device signals)
//!   driven through an explicit suspend/resume flow
//! - Push challenges from notifications or pulled from the server
//! - Query-string or JSON-body submission of signed responses
//!
//! Key storage, enrollment persistence, signal collection and HTTP transport
//! are collaborators behind traits; in-memory implementations are provided for
//! tests and demos, and `HttpRestClient` / `JwksKeyResolver` with the
//! `network` feature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use devicebind_core::{
//!     Collaborators, EngineConfig, FlowOptions, HttpClientConfig, HttpRestClient,
//!     JwksKeyResolver, MemoryEnrollmentStore, Progress, SoftwareKeyStore, VerificationEngine,
//! };
//!
//! # async fn example(raw_challenge: &str) -> devicebind_core::Result<()> {
//! let collaborators = Collaborators::new(
//!     Arc::new(SoftwareKeyStore::new()),
//!     Arc::new(MemoryEnrollmentStore::new()),
//!     Arc::new(HttpRestClient::new(HttpClientConfig::default())?),
//!     Arc::new(JwksKeyResolver::new(
//!         "https://acme.example.com/oauth2/v1/keys".parse().unwrap(),
//!     )),
//! );
//! let engine = VerificationEngine::new(EngineConfig::from_env(), collaborators);
//!
//! let mut flow = engine.verify(raw_challenge, FlowOptions::default()).await?;
//! while let Progress::Step(step) = flow.next().await? {
//!     println!("step: {}", step.name());
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consent;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod keystore;
pub mod policy;
pub mod push;
pub mod response;
pub mod rest;
pub mod signals;
pub mod submit;
pub mod token;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use consent::UserConsentValue;
pub use engine::{
    Collaborators, ConsentResponse, Flow, FlowKind, FlowOptions, Progress, RemediationStep,
    StepAnswer, TransactionContext, VerificationEngine, VerificationOutcome,
};
pub use enrollment::{EnrolledFactor, Enrollment, EnrollmentStore, MemoryEnrollmentStore};
pub use error::{
    DeviceBindError, KeyUnavailableError, ProtocolError, Result, ServerError, TokenError,
    TransportError,
};
pub use keystore::{KeyData, KeyFailure, KeyReadError, KeyStore, SoftwareKeyStore};
pub use policy::{KeyRequirementResolver, KeyType, KeyTypeList};
pub use push::{PushChallenge, PushDecision, PushInbox, UserResponse};
pub use rest::{HttpMethod, RestClient, RestRequest, RestResponse};
pub use signals::{
    DeviceSignalSnapshot, ProviderRegistry, ProviderResult, SignalCollector,
    StaticProviderRegistry, StaticSignalCollector,
};
pub use token::{
    ChallengeKeyResolver, ChallengeToken, StaticKeyResolver, TokenValidation, UserMediation,
    UserVerification,
};

// Network-dependent exports
#[cfg(feature = "network")]
pub use rest::{HttpClientConfig, HttpRestClient};
#[cfg(feature = "network")]
pub use token::JwksKeyResolver;
