//! JWKS-backed challenge key resolver.
//!
//! Issuer keys are fetched from a JSON Web Key Set endpoint and cached per
//! access scope with a TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{self, AlgorithmParameters, EllipticCurve};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use url::Url;

use super::resolver::{ChallengeKeyResolver, VerificationKey};
use crate::error::{DeviceBindError, Result, TokenError, TransportError};

/// Default JWKS cache TTL (1 hour)
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

const UNSCOPED: &str = "";

struct CachedJwks {
    keys: Vec<jwk::Jwk>,
    fetched_at: Instant,
}

#[derive(Deserialize)]
struct JwksResponse {
    keys: Vec<jwk::Jwk>,
}

pub struct JwksKeyResolver {
    jwks_url: Url,
    http_client: reqwest::Client,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedJwks>>,
}

impl JwksKeyResolver {
    pub fn new(jwks_url: Url) -> Self {
        Self::with_client(jwks_url, reqwest::Client::new())
    }

    pub fn with_client(jwks_url: Url, http_client: reqwest::Client) -> Self {
        Self {
            jwks_url,
            http_client,
            ttl: DEFAULT_JWKS_CACHE_TTL,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn keys(&self, scope: &str) -> Result<Vec<jwk::Jwk>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(scope) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.get(scope) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.keys.clone());
            }
        }

        let keys = self.fetch().await?;
        info!(key_count = keys.len(), scope, "Refreshed JWKS cache");

        cache.insert(
            scope.to_string(),
            CachedJwks {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(keys)
    }

    #[instrument(level = "debug", skip(self), fields(jwks_url = %self.jwks_url))]
    async fn fetch(&self) -> Result<Vec<jwk::Jwk>> {
        let response = self
            .http_client
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to fetch JWKS");
                TransportError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "JWKS endpoint returned error");
            return Err(TransportError::Status {
                status: status.as_u16(),
                server_error: None,
            }
            .into());
        }

        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(format!("Invalid JWKS document: {e}")))?;
        Ok(jwks.keys)
    }
}

/// Pick the signature algorithm a JWK is meant for.
fn algorithm_for(key: &jwk::Jwk) -> Option<Algorithm> {
    match &key.algorithm {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        AlgorithmParameters::OctetKey(_) => Some(Algorithm::HS256),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

#[async_trait]
impl ChallengeKeyResolver for JwksKeyResolver {
    async fn resolve(&self, kid: &str, access_scope: Option<&str>) -> Result<VerificationKey> {
        let scope = access_scope.unwrap_or(UNSCOPED);
        let keys = self.keys(scope).await?;

        let jwk = keys
            .into_iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .ok_or_else(|| TokenError::UnknownKeyId(kid.to_string()))?;

        let algorithm = algorithm_for(&jwk).ok_or_else(|| {
            TokenError::MalformedToken(format!("Unsupported key parameters for kid '{kid}'"))
        })?;

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            warn!(error = %e, kid, "Failed to convert JWK to decoding key");
            DeviceBindError::from(TokenError::MalformedToken(format!(
                "Unusable key for kid '{kid}'"
            )))
        })?;

        Ok(VerificationKey { key, algorithm })
    }
}
