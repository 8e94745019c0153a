//! Signed response tokens answering a challenge.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::TransactionContext;
use crate::error::{DeviceBindError, ProtocolError, Result};
use crate::keystore::{KeyData, KeyStore};
use crate::signals::SignalCollector;

/// Transaction type reported when the challenge does not name one.
pub const DEFAULT_TRANSACTION_TYPE: &str = "LOGIN";

pub struct ResponseTokenBuilder<'a> {
    config: &'a EngineConfig,
    key_store: &'a dyn KeyStore,
    signals: &'a dyn SignalCollector,
}

impl<'a> ResponseTokenBuilder<'a> {
    pub fn new(
        config: &'a EngineConfig,
        key_store: &'a dyn KeyStore,
        signals: &'a dyn SignalCollector,
    ) -> Self {
        Self {
            config,
            key_store,
            signals,
        }
    }

    /// Assemble the response claims for `key` and have the key store sign them.
    pub async fn build(&self, context: &TransactionContext, key: &KeyData) -> Result<String> {
        let claims = self.claims(context, key).await?;
        let token = self
            .key_store
            .sign(&self.config.response_token_type, &claims, &key.key_tag)
            .await?;
        debug!(
            transaction_id = %context.token().transaction_id(),
            key_type = %key.key_type,
            "Response token signed"
        );
        Ok(token)
    }

    pub async fn claims(&self, context: &TransactionContext, key: &KeyData) -> Result<Value> {
        let token = context.token();
        let enrollment = context.enrollment().ok_or_else(|| {
            ProtocolError::AccountNotFound {
                org_id: token.org_id().to_string(),
            }
        })?;

        let factor_id = enrollment
            .factors
            .iter()
            .find(|f| f.key_tag(key.key_type) == Some(key.key_tag.as_str()))
            .map(|f| f.factor_id.clone())
            .or_else(|| {
                enrollment
                    .key_binding(key.key_type)
                    .map(|b| b.factor_id.to_string())
            })
            .ok_or_else(|| {
                DeviceBindError::SigningError(format!(
                    "No enrolled factor owns key '{}'",
                    key.key_tag
                ))
            })?;

        let mut device_signals = self.signals.collect(token.signals()).await?;
        // Application-supplied signals win over collected ones.
        for (name, value) in context.device_signals() {
            device_signals.insert(name.clone(), value.clone());
        }

        let transaction_type = token
            .context()
            .transaction_type
            .clone()
            .unwrap_or_else(|| DEFAULT_TRANSACTION_TYPE.to_string());

        let audience = token
            .issuer()
            .map(str::to_string)
            .unwrap_or_else(|| token.verification_uri().origin().ascii_serialization());

        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.config.response_ttl.as_secs()).map_err(|_| {
            DeviceBindError::ConfigError("Response lifetime out of range".into())
        })?;

        let mut claims = Map::new();
        claims.insert("iss".into(), json!(enrollment.enrollment_id));
        claims.insert("aud".into(), json!(audience));
        claims.insert("sub".into(), json!(enrollment.user_id));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + ttl));
        claims.insert("jti".into(), json!(Uuid::new_v4().to_string()));
        claims.insert("nonce".into(), json!(token.nonce()));
        claims.insert("transactionId".into(), json!(token.transaction_id()));
        claims.insert("deviceId".into(), json!(enrollment.device_id));
        claims.insert("deviceEnrollmentId".into(), json!(enrollment.enrollment_id));
        claims.insert("methodEnrollmentId".into(), json!(factor_id));
        claims.insert("keyType".into(), json!(key.key_type));
        claims.insert("amr".into(), json!(key.amr));
        claims.insert(
            "challengeResponseContext".into(),
            json!({
                "userConsent": context.consent(),
                "transactionType": transaction_type,
            }),
        );
        claims.insert("deviceSignals".into(), Value::Object(device_signals));
        if !token.integrations().is_empty() {
            claims.insert(
                "integrations".into(),
                serde_json::to_value(context.integrations())
                    .map_err(|e| DeviceBindError::SerializationError(e.to_string()))?,
            );
        }
        if !token.signal_providers().is_empty() {
            claims.insert(
                "signalProviders".into(),
                serde_json::to_value(context.signal_providers())
                    .map_err(|e| DeviceBindError::SerializationError(e.to_string()))?,
            );
        }

        Ok(Value::Object(claims))
    }
}
