//! Challenge-response verification engine.
//!
//! A [`VerificationEngine`] holds configuration and collaborators and hands
//! out one [`Flow`] per challenge. The flow is an explicit state machine: the
//! caller drives it with [`Flow::next`], which yields either a
//! [`RemediationStep`] or the final [`VerificationOutcome`], and resumes it
//! with [`Flow::answer`] after every interactive step.
//!
//! ```no_run
//! use devicebind_core::engine::{FlowOptions, Progress, RemediationStep, StepAnswer, ConsentResponse};
//! use devicebind_core::VerificationEngine;
//!
//! # async fn example(engine: VerificationEngine, raw: &str) -> devicebind_core::Result<()> {
//! let mut flow = engine.verify(raw, FlowOptions::default()).await?;
//! loop {
//!     match flow.next().await? {
//!         Progress::Step(RemediationStep::UserConsent(_)) => {
//!             flow.answer(StepAnswer::Consent(ConsentResponse::Approved))?;
//!         }
//!         Progress::Step(step) if !step.is_interactive() => continue,
//!         Progress::Step(_) => break,
//!         Progress::Completed(outcome) => {
//!             println!("verified with {}", outcome.key_type);
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cascade;
mod context;
mod flow;
mod step;

pub use context::TransactionContext;
pub use flow::{Flow, FlowKind};
pub use step::{
    AccountCandidate, AccountSelection, ConsentPrompt, ConsentResponse, Progress,
    RemediationMessage, RemediationStep, SignalRequest, StepAnswer, VerificationOutcome,
};

use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::enrollment::EnrollmentStore;
use crate::error::{Result, TokenError};
use crate::keystore::KeyStore;
use crate::rest::RestClient;
use crate::signals::{ProviderRegistry, SignalCollector, StaticProviderRegistry, StaticSignalCollector};
use crate::token::{ChallengeKeyResolver, ChallengeToken};

/// External capabilities the engine consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub key_store: Arc<dyn KeyStore>,
    pub enrollments: Arc<dyn EnrollmentStore>,
    pub signals: Arc<dyn SignalCollector>,
    pub providers: Arc<dyn ProviderRegistry>,
    pub rest: Arc<dyn RestClient>,
    pub key_resolver: Arc<dyn ChallengeKeyResolver>,
}

impl Collaborators {
    /// Collaborators with no device signals and no registered providers.
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        enrollments: Arc<dyn EnrollmentStore>,
        rest: Arc<dyn RestClient>,
        key_resolver: Arc<dyn ChallengeKeyResolver>,
    ) -> Self {
        Self {
            key_store,
            enrollments,
            signals: Arc::new(StaticSignalCollector::default()),
            providers: Arc::new(StaticProviderRegistry::default()),
            rest,
            key_resolver,
        }
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalCollector>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_providers(mut self, providers: Arc<dyn ProviderRegistry>) -> Self {
        self.providers = providers;
        self
    }
}

/// Per-flow options chosen by the caller.
#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    /// Submit in query-string mode with this handle.
    pub state_handle: Option<String>,
    /// Offer a `SelectAccount` step instead of failing when several enrollments match.
    pub allow_account_selection: bool,
    /// Ask the application for extra device signals through a `DeviceSignals` step.
    pub collect_app_signals: bool,
}

/// Cheap to clone; clones share configuration and collaborators.
#[derive(Clone)]
pub struct VerificationEngine {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) collaborators: Arc<Collaborators>,
}

impl VerificationEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collaborators: Arc::new(collaborators),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Parse and validate a challenge with this engine's settings.
    pub async fn parse_challenge(&self, raw: &str) -> Result<ChallengeToken> {
        ChallengeToken::parse(
            raw,
            &self.config.token_validation(),
            self.collaborators.key_resolver.as_ref(),
        )
        .await
    }

    /// Start the generic flow for a raw challenge.
    pub async fn verify(&self, raw: &str, options: FlowOptions) -> Result<Flow> {
        let token = self.parse_challenge(raw).await?;
        self.flow_for(token, options)
    }

    /// Start the generic flow for an already parsed challenge.
    pub fn flow_for(&self, token: ChallengeToken, options: FlowOptions) -> Result<Flow> {
        self.ensure_fresh(&token)?;
        info!(
            transaction_id = %token.transaction_id(),
            org_id = %token.org_id(),
            "Starting verification"
        );
        Ok(Flow::generic(self.clone(), token, options))
    }

    pub(crate) fn ensure_fresh(&self, token: &ChallengeToken) -> Result<()> {
        if token.is_expired(self.config.clock_skew) {
            return Err(TokenError::Expired(format!("expired at {}", token.expires_at())).into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
