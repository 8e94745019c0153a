//! Consent and key-list transitions applied when a key read fails.

use crate::consent::UserConsentValue;
use crate::keystore::KeyFailure;
use crate::policy::{KeyType, KeyTypeList};
use crate::token::UserVerification;

/// State to continue the cascade with after a failed key read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub consent: UserConsentValue,
    pub remaining: KeyTypeList,
}

/// Apply the fallback rules for the key type that just failed.
///
/// `remaining` is the list with the failed head already consumed. Only
/// verification keys change consent; a failed proof-of-possession read just
/// moves on.
pub fn fall_back(
    failed: KeyType,
    failure: KeyFailure,
    remaining: KeyTypeList,
    policy: UserVerification,
    consent: UserConsentValue,
) -> Fallback {
    if !failed.is_user_verification() {
        return Fallback { consent, remaining };
    }

    match failure {
        KeyFailure::CancelledByUser => Fallback {
            consent: UserConsentValue::CancelledUserVerification,
            remaining: KeyTypeList::single(KeyType::ProofOfPossession),
        },
        KeyFailure::TemporarilyUnavailable => Fallback {
            consent: UserConsentValue::UserVerificationTemporarilyUnavailable,
            remaining: KeyTypeList::single(KeyType::ProofOfPossession),
        },
        KeyFailure::PermanentlyUnavailable => Fallback {
            consent: UserConsentValue::UserVerificationPermanentlyUnavailable,
            remaining,
        },
        KeyFailure::Other if policy == UserVerification::Required => Fallback {
            consent: UserConsentValue::UserVerificationPermanentlyUnavailable,
            remaining,
        },
        KeyFailure::Other => Fallback {
            consent: consent.after_verification_failure(),
            remaining,
        },
    }
}
