//! Server-issued challenge tokens.
//!
//! A challenge is a compact JWS whose `typ` header names the challenge kind
//! and whose `kid` header selects the issuer key. Parsing performs every
//! structural, signature and claim check up front; a [`ChallengeToken`] value
//! therefore only exists for challenges that are safe to answer.
//!
//! ```no_run
//! use devicebind_core::token::{ChallengeToken, StaticKeyResolver, TokenValidation};
//!
//! # async fn example(raw: &str) -> devicebind_core::Result<()> {
//! let resolver = StaticKeyResolver::new().with_hmac_secret("issuer-key-1", b"secret");
//! let token = ChallengeToken::parse(raw, &TokenValidation::default(), &resolver).await?;
//! println!("transaction {}", token.transaction_id());
//! # Ok(())
//! # }
//! ```

mod claims;
#[cfg(feature = "network")]
mod jwks;
mod resolver;

pub use claims::{ChallengeContext, MethodType, UserMediation, UserVerification};
#[cfg(feature = "network")]
pub use jwks::JwksKeyResolver;
pub use resolver::{ChallengeKeyResolver, StaticKeyResolver, VerificationKey};

use std::collections::HashSet;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Header, Validation};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::error::{Result, TokenError};
use crate::policy::KeyType;

/// What a challenge must look like to be accepted.
#[derive(Debug, Clone)]
pub struct TokenValidation {
    /// Expected `typ` header.
    pub expected_type: String,
    /// Key partition handed to the key resolver.
    pub access_scope: Option<String>,
    /// Tolerated clock difference for `iat` and `exp`.
    pub clock_skew: Duration,
}

impl Default for TokenValidation {
    fn default() -> Self {
        EngineConfig::default().token_validation()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClaims {
    iss: Option<String>,
    aud: Option<Value>,
    sub: Option<String>,
    iat: Option<f64>,
    exp: Option<f64>,
    nonce: Option<String>,
    transaction_id: Option<String>,
    org_id: Option<String>,
    key_type: Option<String>,
    key_types: Option<Vec<String>>,
    user_verification: Option<String>,
    user_mediation: Option<String>,
    method: Option<String>,
    verification_uri: Option<String>,
    app_instance_name: Option<String>,
    #[serde(default)]
    signals: Vec<String>,
    #[serde(default)]
    integrations: Vec<Value>,
    #[serde(default)]
    signal_providers: Vec<Value>,
    #[serde(default)]
    challenge_context: Option<ChallengeContext>,
}

/// A validated, immutable challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeToken {
    raw: String,
    issuer: Option<String>,
    audience: Option<String>,
    subject: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    nonce: String,
    transaction_id: String,
    org_id: String,
    key_types: Vec<KeyType>,
    user_verification: UserVerification,
    user_mediation: UserMediation,
    method: MethodType,
    verification_uri: Url,
    app_instance_name: Option<String>,
    signals: Vec<String>,
    integrations: Vec<String>,
    signal_providers: Vec<String>,
    context: ChallengeContext,
}

impl ChallengeToken {
    /// Parse and fully validate a compact challenge token.
    pub async fn parse(
        raw: &str,
        validation: &TokenValidation,
        resolver: &dyn ChallengeKeyResolver,
    ) -> Result<Self> {
        let raw = raw.trim();
        check_compact_form(raw)?;

        let header = decode_header(raw)
            .map_err(|e| TokenError::MalformedToken(format!("Invalid header: {e}")))?;

        let typ_matches = header
            .typ
            .as_deref()
            .is_some_and(|typ| typ.eq_ignore_ascii_case(&validation.expected_type));
        if !typ_matches {
            return Err(TokenError::UnexpectedTokenType {
                expected: validation.expected_type.clone(),
                actual: header.typ,
            }
            .into());
        }

        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| TokenError::MalformedToken("Header missing 'kid' field".into()))?;

        let key = resolver
            .resolve(kid, validation.access_scope.as_deref())
            .await?;

        // Time and claim checks are done below so that failures map onto our
        // own error variants instead of the library's.
        let mut rules = Validation::new(key.algorithm);
        rules.validate_exp = false;
        rules.validate_nbf = false;
        rules.validate_aud = false;
        rules.required_spec_claims = HashSet::new();

        let data = decode::<RawClaims>(raw, &key.key, &rules).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::SignatureInvalid
            }
            _ => TokenError::MalformedToken(format!("Token decoding failed: {e}")),
        })?;

        let token = Self::from_claims(raw, data.claims, validation.clock_skew, Utc::now())?;
        debug!(
            transaction_id = %token.transaction_id,
            org_id = %token.org_id,
            method = %token.method,
            "Challenge token validated"
        );
        Ok(token)
    }

    fn from_claims(
        raw: &str,
        claims: RawClaims,
        skew: Duration,
        now: DateTime<Utc>,
    ) -> std::result::Result<Self, TokenError> {
        let skew = chrono::Duration::from_std(skew)
            .map_err(|e| TokenError::MalformedToken(format!("Invalid clock skew: {e}")))?;

        let (earliest, latest) = now
            .checked_sub_signed(skew)
            .zip(now.checked_add_signed(skew))
            .ok_or_else(|| TokenError::MalformedToken("Clock skew is out of range".into()))?;

        let issued_at = timestamp(claims.iat, "iat")?;
        let expires_at = timestamp(claims.exp, "exp")?;
        if issued_at > latest {
            return Err(TokenError::Expired(format!(
                "issued in the future at {issued_at}"
            )));
        }
        if expires_at < earliest {
            return Err(TokenError::Expired(format!("expired at {expires_at}")));
        }

        let org_id = required(claims.org_id, "orgId")?;
        let nonce = required(claims.nonce, "nonce")?;
        let transaction_id = required(claims.transaction_id, "transactionId")?;
        let verification_uri = required(claims.verification_uri, "verificationUri")?;
        let verification_uri = Url::parse(&verification_uri).map_err(|e| {
            TokenError::MalformedToken(format!("verificationUri is not a valid URL: {e}"))
        })?;

        let key_types = reconcile_key_types(claims.key_types, claims.key_type)?;

        Ok(Self {
            raw: raw.to_string(),
            issuer: claims.iss,
            audience: claims.aud.as_ref().and_then(first_audience),
            subject: claims.sub,
            issued_at,
            expires_at,
            nonce,
            transaction_id,
            org_id,
            key_types,
            user_verification: UserVerification::from_claim(claims.user_verification.as_deref()),
            user_mediation: UserMediation::from_claim(claims.user_mediation.as_deref()),
            method: MethodType::from_claim(claims.method.as_deref()),
            verification_uri,
            app_instance_name: claims.app_instance_name,
            signals: claims.signals,
            integrations: names(&claims.integrations),
            signal_providers: names(&claims.signal_providers),
            context: claims.challenge_context.unwrap_or_default(),
        })
    }

    /// The compact token exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// User the challenge was issued for, when the server names one.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True once the expiry lies further in the past than `clock_skew`.
    ///
    /// An expiry too far in the future to add the skew to never expires.
    pub fn is_expired(&self, clock_skew: Duration) -> bool {
        self.is_expired_at(clock_skew, Utc::now())
    }

    pub(crate) fn is_expired_at(&self, clock_skew: Duration, now: DateTime<Utc>) -> bool {
        let skew =
            chrono::Duration::from_std(clock_skew).unwrap_or_else(|_| chrono::Duration::zero());
        self.expires_at
            .checked_add_signed(skew)
            .is_some_and(|limit| limit < now)
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// Key types the server accepts, in server order.
    pub fn key_types(&self) -> &[KeyType] {
        &self.key_types
    }

    pub fn user_verification(&self) -> UserVerification {
        self.user_verification
    }

    pub fn user_mediation(&self) -> UserMediation {
        self.user_mediation
    }

    pub fn method(&self) -> MethodType {
        self.method
    }

    pub fn verification_uri(&self) -> &Url {
        &self.verification_uri
    }

    pub fn app_instance_name(&self) -> Option<&str> {
        self.app_instance_name.as_deref()
    }

    /// Device signal names the server asks for.
    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    pub fn integrations(&self) -> &[String] {
        &self.integrations
    }

    pub fn signal_providers(&self) -> &[String] {
        &self.signal_providers
    }

    pub fn context(&self) -> &ChallengeContext {
        &self.context
    }
}

/// Decode header and payload without checking anything but the encoding.
///
/// Intended for diagnostics only; the result must never be acted upon.
pub fn decode_unverified(raw: &str) -> std::result::Result<(Header, Value), TokenError> {
    let raw = raw.trim();
    check_compact_form(raw)?;
    let header = decode_header(raw)
        .map_err(|e| TokenError::MalformedToken(format!("Invalid header: {e}")))?;
    let payload = raw.split('.').nth(1).unwrap_or_default();
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::MalformedToken(format!("Invalid payload encoding: {e}")))?;
    let claims = serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::MalformedToken(format!("Invalid payload JSON: {e}")))?;
    Ok((header, claims))
}

fn check_compact_form(raw: &str) -> std::result::Result<(), TokenError> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(TokenError::MalformedToken(format!(
            "Expected 3 non-empty parts, got {}",
            parts.len()
        )));
    }
    Ok(())
}

fn required(value: Option<String>, name: &str) -> std::result::Result<String, TokenError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| TokenError::MissingClaim(name.to_string()))
}

/// NumericDate claims may carry a fractional part; it is dropped.
fn timestamp(value: Option<f64>, name: &str) -> std::result::Result<DateTime<Utc>, TokenError> {
    let secs = value.ok_or_else(|| TokenError::MissingClaim(name.to_string()))?;
    if !secs.is_finite() || secs.abs() >= i64::MAX as f64 {
        return Err(TokenError::MalformedToken(format!("'{name}' is out of range")));
    }
    Utc.timestamp_opt(secs.trunc() as i64, 0)
        .single()
        .ok_or_else(|| TokenError::MalformedToken(format!("'{name}' is out of range")))
}

/// Plural `keyTypes` wins; the legacy singular form becomes a one-element list.
fn reconcile_key_types(
    plural: Option<Vec<String>>,
    singular: Option<String>,
) -> std::result::Result<Vec<KeyType>, TokenError> {
    let names = match plural {
        Some(list) if !list.is_empty() => list,
        _ => singular.into_iter().collect(),
    };

    let mut key_types = Vec::with_capacity(names.len());
    for name in &names {
        match name.parse::<KeyType>() {
            Ok(kt) if !key_types.contains(&kt) => key_types.push(kt),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Ignoring unsupported key type"),
        }
    }

    if key_types.is_empty() {
        return Err(TokenError::MissingClaim("keyTypes".into()));
    }
    Ok(key_types)
}

fn first_audience(aud: &Value) -> Option<String> {
    match aud {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
}

/// Integration entries may be bare names or `{"name": ...}` objects.
fn names(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}
