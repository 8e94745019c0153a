//! Engine configuration.
//!
//! Values have sensible defaults and can be overridden from `DEVICEBIND_*`
//! environment variables.

use std::time::Duration;

use crate::token::TokenValidation;

/// `typ` header carried by challenge tokens.
pub const DEFAULT_CHALLENGE_TOKEN_TYPE: &str = "devicebind-challenge+jwt";
/// `typ` header stamped on response tokens.
pub const DEFAULT_RESPONSE_TOKEN_TYPE: &str = "devicebind-response+jwt";
/// Push payload version this engine understands.
pub const DEFAULT_PUSH_PAYLOAD_VERSION: &str = "IDXv1";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Allowed clock difference between device and server (default: 300s)
    pub clock_skew: Duration,
    /// Expected challenge `typ` header
    pub challenge_token_type: String,
    /// `typ` header for response tokens
    pub response_token_type: String,
    /// Lifetime of a signed response token (default: 300s)
    pub response_ttl: Duration,
    /// Required `payloadVersion` of push notifications
    pub push_payload_version: String,
    /// Key partition used when resolving challenge signing keys
    pub access_scope: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clock_skew: Duration::from_secs(300),
            challenge_token_type: DEFAULT_CHALLENGE_TOKEN_TYPE.to_string(),
            response_token_type: DEFAULT_RESPONSE_TOKEN_TYPE.to_string(),
            response_ttl: Duration::from_secs(300),
            push_payload_version: DEFAULT_PUSH_PAYLOAD_VERSION.to_string(),
            access_scope: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let clock_skew = std::env::var("DEVICEBIND_CLOCK_SKEW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.clock_skew);

        let challenge_token_type = std::env::var("DEVICEBIND_CHALLENGE_TOKEN_TYPE")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.challenge_token_type);

        let response_token_type = std::env::var("DEVICEBIND_RESPONSE_TOKEN_TYPE")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.response_token_type);

        let response_ttl = std::env::var("DEVICEBIND_RESPONSE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.response_ttl);

        let push_payload_version = std::env::var("DEVICEBIND_PUSH_PAYLOAD_VERSION")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.push_payload_version);

        let access_scope = std::env::var("DEVICEBIND_ACCESS_SCOPE")
            .ok()
            .filter(|v| !v.is_empty());

        Self {
            clock_skew,
            challenge_token_type,
            response_token_type,
            response_ttl,
            push_payload_version,
            access_scope,
        }
    }

    /// Validation rules for challenges handled by this engine.
    pub fn token_validation(&self) -> TokenValidation {
        TokenValidation {
            expected_type: self.challenge_token_type.clone(),
            access_scope: self.access_scope.clone(),
            clock_skew: self.clock_skew,
        }
    }
}
