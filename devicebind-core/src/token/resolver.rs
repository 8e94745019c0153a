//! Resolution of the keys that sign challenge tokens.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::error::{Result, TokenError};

/// Verification key plus the one algorithm it may be used with.
#[derive(Clone)]
pub struct VerificationKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Looks up the key that signed a challenge by its `kid` header.
///
/// The access scope names the key partition the caller is entitled to; a
/// resolver must never serve keys fetched for one scope to another.
#[async_trait]
pub trait ChallengeKeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str, access_scope: Option<&str>) -> Result<VerificationKey>;
}

/// Fixed set of keys, for tests and for deployments that pin issuer keys.
#[derive(Default, Clone)]
pub struct StaticKeyResolver {
    keys: HashMap<String, VerificationKey>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kid: impl Into<String>, key: VerificationKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    /// Register an HMAC-SHA256 shared secret under `kid`.
    pub fn with_hmac_secret(self, kid: impl Into<String>, secret: &[u8]) -> Self {
        self.with_key(
            kid,
            VerificationKey {
                key: DecodingKey::from_secret(secret),
                algorithm: Algorithm::HS256,
            },
        )
    }
}

#[async_trait]
impl ChallengeKeyResolver for StaticKeyResolver {
    async fn resolve(&self, kid: &str, _access_scope: Option<&str>) -> Result<VerificationKey> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| TokenError::UnknownKeyId(kid.to_string()).into())
    }
}
