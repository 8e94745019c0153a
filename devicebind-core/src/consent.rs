//! Protocol-level encoding of how the user approved (or did not approve) a
//! transaction.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UserConsentValue {
    #[serde(rename = "APPROVED_CONSENT_PROMPT")]
    Approved,
    #[serde(rename = "DENIED_CONSENT_PROMPT")]
    Denied,
    #[serde(rename = "APPROVED_USER_VERIFICATION")]
    ApprovedUserVerification,
    #[serde(rename = "CANCELLED_USER_VERIFICATION")]
    CancelledUserVerification,
    #[serde(rename = "UV_TEMPORARILY_UNAVAILABLE")]
    UserVerificationTemporarilyUnavailable,
    #[serde(rename = "UV_PERMANENTLY_UNAVAILABLE")]
    UserVerificationPermanentlyUnavailable,
    #[default]
    #[serde(rename = "NONE")]
    None,
}

impl UserConsentValue {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED_CONSENT_PROMPT",
            Self::Denied => "DENIED_CONSENT_PROMPT",
            Self::ApprovedUserVerification => "APPROVED_USER_VERIFICATION",
            Self::CancelledUserVerification => "CANCELLED_USER_VERIFICATION",
            Self::UserVerificationTemporarilyUnavailable => "UV_TEMPORARILY_UNAVAILABLE",
            Self::UserVerificationPermanentlyUnavailable => "UV_PERMANENTLY_UNAVAILABLE",
            Self::None => "NONE",
        }
    }

    /// Transition applied when a verification key fails for an unclassified reason.
    pub fn after_verification_failure(self) -> Self {
        match self {
            Self::ApprovedUserVerification => Self::None,
            other => other,
        }
    }
}

impl fmt::Display for UserConsentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
