//! Claim-level enums carried by a challenge token.
//!
//! Input is matched case-insensitively; anything unrecognised maps to the
//! `Unknown` variant instead of failing the whole token.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    None,
    Discouraged,
    Preferred,
    Required,
    #[default]
    Unknown,
}

impl UserVerification {
    pub fn from_claim(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("none") => Self::None,
            Some("discouraged") => Self::Discouraged,
            Some("preferred") => Self::Preferred,
            Some("required") => Self::Required,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserMediation {
    None,
    Optional,
    Required,
    #[default]
    Unknown,
}

impl UserMediation {
    pub fn from_claim(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("none") => Self::None,
            Some("optional") => Self::Optional,
            Some("required") => Self::Required,
            _ => Self::Unknown,
        }
    }

    /// Whether the user must be shown a consent prompt before a silent key is used.
    pub fn wants_consent(self) -> bool {
        matches!(self, Self::Optional | Self::Required)
    }
}

/// How the challenge reached the device, echoed back in body-mode submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MethodType {
    Push,
    SignedNonce,
    #[default]
    Unknown,
}

impl MethodType {
    pub fn from_claim(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("push") => Self::Push,
            Some("signed_nonce") | Some("signednonce") => Self::SignedNonce,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::SignedNonce => "signed_nonce",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form context describing the transaction the user is asked about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeContext {
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub client_location: Option<String>,
    #[serde(default, rename = "clientOS")]
    pub client_os: Option<String>,
    #[serde(default)]
    pub binding_message: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<String>,
}
