//! Enrollments the device holds and the store that looks them up.
//!
//! The engine only reads enrollments. Creating, updating and persisting them
//! belongs to the enrollment transaction.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::policy::KeyType;

/// One enrolled authenticator factor and the key tags it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledFactor {
    pub factor_id: String,
    #[serde(default)]
    pub proof_of_possession_key_tag: Option<String>,
    #[serde(default)]
    pub user_verification_key_tag: Option<String>,
    #[serde(default)]
    pub user_verification_bio_or_pin_key_tag: Option<String>,
    /// Where pending push challenges for this factor can be pulled from
    #[serde(default)]
    pub pending_challenge_link: Option<Url>,
}

impl EnrolledFactor {
    pub fn key_tag(&self, key_type: KeyType) -> Option<&str> {
        match key_type {
            KeyType::ProofOfPossession => self.proof_of_possession_key_tag.as_deref(),
            KeyType::UserVerification => self.user_verification_key_tag.as_deref(),
            KeyType::UserVerificationBioOrPin => {
                self.user_verification_bio_or_pin_key_tag.as_deref()
            }
        }
    }
}

/// Key tag and owning factor for one key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding<'a> {
    pub factor_id: &'a str,
    pub key_tag: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub enrollment_id: String,
    pub org_id: String,
    /// Base URL of the organization the device enrolled with
    pub org_url: Url,
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub device_id: String,
    #[serde(default)]
    pub factors: Vec<EnrolledFactor>,
}

impl Enrollment {
    /// First factor holding a key of `key_type`.
    pub fn key_binding(&self, key_type: KeyType) -> Option<KeyBinding<'_>> {
        self.factors.iter().find_map(|factor| {
            factor.key_tag(key_type).map(|key_tag| KeyBinding {
                factor_id: &factor.factor_id,
                key_tag,
            })
        })
    }

    /// Link for pulling pending push challenges, from the first factor that has one.
    pub fn pending_challenge_link(&self) -> Option<&Url> {
        self.factors
            .iter()
            .find_map(|factor| factor.pending_challenge_link.as_ref())
    }

    /// Whether `issuer` is served from this enrollment's organization host.
    pub fn owns_issuer(&self, issuer: &str) -> bool {
        let Ok(issuer) = Url::parse(issuer) else {
            return false;
        };
        match (issuer.host_str(), self.org_url.host_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

/// Read-only access to the device's enrollments.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// All enrollments for an organization, in a stable order.
    async fn lookup(&self, org_id: &str) -> Result<Vec<Enrollment>>;

    async fn get(&self, enrollment_id: &str) -> Result<Option<Enrollment>>;
}

/// In-memory enrollment store.
#[derive(Debug, Default)]
pub struct MemoryEnrollmentStore {
    enrollments: DashMap<String, Enrollment>,
}

impl MemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an enrollment, keyed by enrollment id.
    pub fn insert(&self, enrollment: Enrollment) {
        self.enrollments
            .insert(enrollment.enrollment_id.clone(), enrollment);
    }

    pub fn remove(&self, enrollment_id: &str) -> Option<Enrollment> {
        self.enrollments.remove(enrollment_id).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.enrollments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enrollments.is_empty()
    }
}

impl FromIterator<Enrollment> for MemoryEnrollmentStore {
    fn from_iter<I: IntoIterator<Item = Enrollment>>(iter: I) -> Self {
        let store = Self::new();
        for enrollment in iter {
            store.insert(enrollment);
        }
        store
    }
}

#[async_trait]
impl EnrollmentStore for MemoryEnrollmentStore {
    async fn lookup(&self, org_id: &str) -> Result<Vec<Enrollment>> {
        let mut matches: Vec<Enrollment> = self
            .enrollments
            .iter()
            .filter(|entry| entry.org_id == org_id)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| a.enrollment_id.cmp(&b.enrollment_id));
        Ok(matches)
    }

    async fn get(&self, enrollment_id: &str) -> Result<Option<Enrollment>> {
        Ok(self.enrollments.get(enrollment_id).map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(id: &str, org_id: &str) -> Enrollment {
        Enrollment {
            enrollment_id: id.to_string(),
            org_id: org_id.to_string(),
            org_url: Url::parse("https://acme.example.com").unwrap(),
            user_id: format!("user-{id}"),
            username: None,
            device_id: "device-1".into(),
            factors: vec![
                EnrolledFactor {
                    factor_id: "factor-pop".into(),
                    proof_of_possession_key_tag: Some("pop-tag".into()),
                    user_verification_key_tag: None,
                    user_verification_bio_or_pin_key_tag: None,
                    pending_challenge_link: None,
                },
                EnrolledFactor {
                    factor_id: "factor-uv".into(),
                    proof_of_possession_key_tag: None,
                    user_verification_key_tag: Some("uv-tag".into()),
                    user_verification_bio_or_pin_key_tag: None,
                    pending_challenge_link: Some(
                        Url::parse("https://acme.example.com/pending").unwrap(),
                    ),
                },
            ],
        }
    }

    #[test]
    fn test_key_binding_finds_owning_factor() {
        let e = enrollment("e1", "org-1");
        let binding = e.key_binding(KeyType::UserVerification).unwrap();
        assert_eq!(binding.factor_id, "factor-uv");
        assert_eq!(binding.key_tag, "uv-tag");
        assert!(e.key_binding(KeyType::UserVerificationBioOrPin).is_none());
        assert_eq!(
            e.pending_challenge_link().map(Url::as_str),
            Some("https://acme.example.com/pending")
        );
    }

    #[test]
    fn test_issuer_host_match() {
        let e = enrollment("e1", "org-1");
        assert!(e.owns_issuer("https://ACME.example.com/oauth2"));
        assert!(!e.owns_issuer("https://evil.example.com"));
        assert!(!e.owns_issuer("not a url"));
    }

    #[tokio::test]
    async fn test_lookup_filters_by_org_and_sorts() {
        let store: MemoryEnrollmentStore = [
            enrollment("e2", "org-1"),
            enrollment("e1", "org-1"),
            enrollment("e3", "org-2"),
        ]
        .into_iter()
        .collect();

        let found = store.lookup("org-1").await.unwrap();
        let ids: Vec<_> = found.iter().map(|e| e.enrollment_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert!(store.lookup("org-9").await.unwrap().is_empty());
        assert!(store.get("e3").await.unwrap().is_some());
    }
}
