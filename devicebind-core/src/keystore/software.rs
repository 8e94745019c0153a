//! Software key store.
//!
//! Keys are HMAC-SHA256 secrets held in memory. Useful for tests, demos and
//! platforms without secure hardware; reads can be scripted to fail so that
//! fallback behaviour can be exercised without a real biometric prompt.
//! WARNING: Do not use in production - keys are not hardware bound!

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::Value;
use tracing::debug;

use super::{KeyData, KeyReadError, KeyStore};
use crate::error::{DeviceBindError, Result};
use crate::policy::KeyType;

struct SoftwareKey {
    secret: Vec<u8>,
    key_type: KeyType,
    amr: Vec<String>,
}

#[derive(Default)]
pub struct SoftwareKeyStore {
    keys: DashMap<String, SoftwareKey>,
    scripted_failures: DashMap<String, VecDeque<KeyReadError>>,
    reads: Mutex<Vec<(String, KeyType)>>,
}

impl SoftwareKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key. Verification keys report a "user_verification" AMR when read.
    pub fn add_key(&self, key_tag: impl Into<String>, key_type: KeyType, secret: &[u8]) {
        let amr = if key_type.is_user_verification() {
            vec!["user_verification".to_string()]
        } else {
            Vec::new()
        };
        self.add_key_with_amr(key_tag, key_type, secret, amr);
    }

    pub fn add_key_with_amr(
        &self,
        key_tag: impl Into<String>,
        key_type: KeyType,
        secret: &[u8],
        amr: Vec<String>,
    ) {
        self.keys.insert(
            key_tag.into(),
            SoftwareKey {
                secret: secret.to_vec(),
                key_type,
                amr,
            },
        );
    }

    pub fn remove_key(&self, key_tag: &str) -> bool {
        self.keys.remove(key_tag).is_some()
    }

    /// Make the next read of `key_tag` fail with `error`. Failures queue up.
    pub fn fail_next_read(&self, key_tag: impl Into<String>, error: KeyReadError) {
        self.scripted_failures
            .entry(key_tag.into())
            .or_default()
            .push_back(error);
    }

    /// Every read attempted so far, in order.
    pub fn reads(&self) -> Vec<(String, KeyType)> {
        self.reads
            .lock()
            .map(|reads| reads.clone())
            .unwrap_or_default()
    }

    /// Key that verifies tokens signed under `key_tag`.
    pub fn decoding_key(&self, key_tag: &str) -> Option<DecodingKey> {
        self.keys
            .get(key_tag)
            .map(|key| DecodingKey::from_secret(&key.secret))
    }

    fn record_read(&self, key_tag: &str, key_type: KeyType) {
        if let Ok(mut reads) = self.reads.lock() {
            reads.push((key_tag.to_string(), key_type));
        }
    }

    fn scripted_failure(&self, key_tag: &str) -> Option<KeyReadError> {
        self.scripted_failures
            .get_mut(key_tag)
            .and_then(|mut queue| queue.pop_front())
    }
}

impl std::fmt::Debug for SoftwareKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareKeyStore")
            .field("keys", &self.keys.len())
            .field("scripted_failures", &self.scripted_failures.len())
            .finish()
    }
}

#[async_trait]
impl KeyStore for SoftwareKeyStore {
    async fn read_or_use_key(
        &self,
        key_tag: &str,
        key_type: KeyType,
    ) -> std::result::Result<KeyData, KeyReadError> {
        self.record_read(key_tag, key_type);

        if let Some(error) = self.scripted_failure(key_tag) {
            debug!(key_tag, %key_type, error = %error, "Scripted key read failure");
            return Err(error);
        }

        let key = self.keys.get(key_tag).ok_or_else(|| {
            KeyReadError::permanently_unavailable(format!("No key stored under '{key_tag}'"))
        })?;

        if key.key_type != key_type {
            return Err(KeyReadError::permanently_unavailable(format!(
                "Key '{key_tag}' is a {} key, not {key_type}",
                key.key_type
            )));
        }

        Ok(KeyData {
            key_handle: format!("software:{key_tag}"),
            key_tag: key_tag.to_string(),
            amr: key.amr.clone(),
            key_type,
        })
    }

    async fn sign(&self, token_type: &str, claims: &Value, key_tag: &str) -> Result<String> {
        let secret = self
            .keys
            .get(key_tag)
            .map(|key| key.secret.clone())
            .ok_or_else(|| {
                DeviceBindError::SigningError(format!("No key stored under '{key_tag}'"))
            })?;

        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some(token_type.to_string());
        header.kid = Some(key_tag.to_string());

        encode(&header, claims, &EncodingKey::from_secret(&secret))
            .map_err(|e| DeviceBindError::SigningError(e.to_string()))
    }
}
