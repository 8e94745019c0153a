//! Device key store collaborator.
//!
//! The engine never touches key material. It asks the key store to read (and
//! when required, unlock through biometrics or passcode) the key stored under
//! a tag, and later to sign the response claims with that key.

mod software;

pub use software::SoftwareKeyStore;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::Result;
use crate::policy::KeyType;

/// Why a key could not be read or used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyFailure {
    /// The user dismissed the biometric or passcode prompt.
    CancelledByUser,
    /// Local authentication failed or is locked out for now.
    TemporarilyUnavailable,
    /// The key is missing, corrupted or invalidated.
    PermanentlyUnavailable,
    Other,
}

impl fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CancelledByUser => "cancelledByUser",
            Self::TemporarilyUnavailable => "temporarilyUnavailable",
            Self::PermanentlyUnavailable => "permanentlyUnavailable",
            Self::Other => "otherFailure",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct KeyReadError {
    pub kind: KeyFailure,
    pub message: String,
}

impl KeyReadError {
    pub fn new(kind: KeyFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled_by_user(message: impl Into<String>) -> Self {
        Self::new(KeyFailure::CancelledByUser, message)
    }

    pub fn temporarily_unavailable(message: impl Into<String>) -> Self {
        Self::new(KeyFailure::TemporarilyUnavailable, message)
    }

    pub fn permanently_unavailable(message: impl Into<String>) -> Self {
        Self::new(KeyFailure::PermanentlyUnavailable, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(KeyFailure::Other, message)
    }
}

/// A key that was successfully read and is ready to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyData {
    /// Opaque platform handle for the key
    pub key_handle: String,
    /// Tag the key is stored under
    pub key_tag: String,
    /// Authentication methods that unlocked the key (e.g. "fingerprint", "pin")
    pub amr: Vec<String>,
    pub key_type: KeyType,
}

/// Platform key storage (Secure Enclave, Android Keystore, TPM, software).
///
/// Implementations must be thread-safe (`Send + Sync`); several verification
/// flows may share one store.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Read the key stored under `key_tag`, prompting the user if the key is gated.
    async fn read_or_use_key(
        &self,
        key_tag: &str,
        key_type: KeyType,
    ) -> std::result::Result<KeyData, KeyReadError>;

    /// Sign `claims` as a compact JWS with the key stored under `key_tag`.
    async fn sign(&self, token_type: &str, claims: &Value, key_tag: &str) -> Result<String>;
}
