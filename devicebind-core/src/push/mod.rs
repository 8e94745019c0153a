//! Push-delivered challenges.
//!
//! A push challenge reaches the device either inside a notification payload
//! or through a pull from the enrollment's pending-challenge link. Both shapes
//! are `{"payloadVersion": "...", "challenge": "<jwt>"}`.
//!
//! Two challenges are equal when they carry the same transaction id, so
//! callers receiving the same transaction over both channels can dedup with a
//! `HashSet` or a [`PushInbox`].

mod inbox;

pub use inbox::PushInbox;

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use crate::engine::{Flow, FlowOptions, VerificationEngine};
use crate::enrollment::Enrollment;
use crate::error::{DeviceBindError, ProtocolError, Result};
use crate::rest::RestRequest;
use crate::token::{ChallengeContext, ChallengeToken};

/// Keys a notification may carry the challenge under.
const CHALLENGE_KEYS: [&str; 2] = ["challenge", "challengeRequest"];

/// The user's answer to a push challenge. Moves away from `NotResponded` once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserResponse {
    #[default]
    NotResponded,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    Approve,
    Deny,
}

impl From<PushDecision> for UserResponse {
    fn from(decision: PushDecision) -> Self {
        match decision {
            PushDecision::Approve => Self::Approved,
            PushDecision::Deny => Self::Denied,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushChallenge {
    token: ChallengeToken,
    origin: Url,
    user_response: UserResponse,
    enrollment: Option<Enrollment>,
}

impl PushChallenge {
    pub(crate) fn new(token: ChallengeToken) -> Self {
        let origin = token
            .issuer()
            .and_then(|issuer| Url::parse(issuer).ok())
            .unwrap_or_else(|| {
                let mut origin = token.verification_uri().clone();
                origin.set_path("/");
                origin.set_query(None);
                origin
            });
        Self {
            token,
            origin,
            user_response: UserResponse::NotResponded,
            enrollment: None,
        }
    }

    pub fn token(&self) -> &ChallengeToken {
        &self.token
    }

    pub fn transaction_id(&self) -> &str {
        self.token.transaction_id()
    }

    /// Issuer URL the challenge came from.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.token.issued_at()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.token.expires_at()
    }

    /// Location, client OS, transaction type and binding message to show the user.
    pub fn context(&self) -> &ChallengeContext {
        self.token.context()
    }

    pub fn user_response(&self) -> UserResponse {
        self.user_response
    }

    pub fn enrollment(&self) -> Option<&Enrollment> {
        self.enrollment.as_ref()
    }

    /// Record the user's decision. Repeating the same decision is a no-op.
    pub fn respond(&mut self, decision: PushDecision) -> std::result::Result<(), ProtocolError> {
        let response = UserResponse::from(decision);
        match self.user_response {
            UserResponse::NotResponded => {
                self.user_response = response;
                Ok(())
            }
            current if current == response => Ok(()),
            current => Err(ProtocolError::AlreadyResponded(format!("{current:?}"))),
        }
    }

    pub fn approve(&mut self) -> std::result::Result<(), ProtocolError> {
        self.respond(PushDecision::Approve)
    }

    pub fn deny(&mut self) -> std::result::Result<(), ProtocolError> {
        self.respond(PushDecision::Deny)
    }

    pub fn is_expired(&self, clock_skew: Duration) -> bool {
        self.token.is_expired(clock_skew)
    }

    pub(crate) fn bind_enrollment(&mut self, enrollment: Enrollment) {
        if self.enrollment.is_none() {
            self.enrollment = Some(enrollment);
        }
    }
}

impl PartialEq for PushChallenge {
    fn eq(&self, other: &Self) -> bool {
        self.transaction_id() == other.transaction_id()
    }
}

impl Eq for PushChallenge {}

impl Hash for PushChallenge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.transaction_id().hash(state);
    }
}

impl VerificationEngine {
    /// Extract and validate the challenge carried by a push notification.
    pub async fn parse_push_notification(&self, payload: &Value) -> Result<PushChallenge> {
        let version = payload.get("payloadVersion").and_then(Value::as_str);
        if version != Some(self.config.push_payload_version.as_str()) {
            return Err(ProtocolError::PushNotRecognized(format!(
                "unsupported payload version {version:?}"
            ))
            .into());
        }

        let raw = CHALLENGE_KEYS
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .ok_or_else(|| {
                ProtocolError::PushNotRecognized("payload carries no challenge".into())
            })?;

        let token = self.parse_challenge(raw).await?;
        debug!(transaction_id = %token.transaction_id(), "Push challenge parsed");
        Ok(PushChallenge::new(token))
    }

    /// Fetch the challenges pending for `enrollment`.
    ///
    /// Items that fail to parse or validate, or that belong to another
    /// organization, are skipped. Duplicated transaction ids are kept once.
    #[instrument(level = "debug", skip(self, enrollment, authorization), fields(enrollment_id = %enrollment.enrollment_id))]
    pub async fn pull_push_challenges(
        &self,
        enrollment: &Enrollment,
        authorization: Option<&str>,
    ) -> Result<Vec<PushChallenge>> {
        let link = enrollment.pending_challenge_link().ok_or_else(|| {
            DeviceBindError::ConfigError(format!(
                "Enrollment {} has no pending challenge link",
                enrollment.enrollment_id
            ))
        })?;

        let mut request = RestRequest::get(link.clone());
        if let Some(authorization) = authorization {
            request = request.with_header("Authorization", authorization);
        }

        let response = self
            .collaborators
            .rest
            .submit(request)
            .await?
            .ensure_success()?;
        let items: Vec<Value> = response.json()?;

        let mut seen = HashSet::new();
        let mut challenges = Vec::with_capacity(items.len());
        for item in &items {
            let mut challenge = match self.parse_push_notification(item).await {
                Ok(challenge) => challenge,
                Err(e) => {
                    debug!(error = %e, "Skipping pending challenge");
                    continue;
                }
            };
            let token = challenge.token();
            if token.org_id() != enrollment.org_id
                || !token.issuer().is_some_and(|iss| enrollment.owns_issuer(iss))
            {
                debug!(transaction_id = %token.transaction_id(), "Skipping challenge for another organization");
                continue;
            }
            if !seen.insert(challenge.transaction_id().to_string()) {
                continue;
            }
            challenge.bind_enrollment(enrollment.clone());
            challenges.push(challenge);
        }

        info!(
            received = items.len(),
            accepted = challenges.len(),
            "Pulled pending push challenges"
        );
        Ok(challenges)
    }

    /// Start the push flow. Expired challenges are rejected here, before any step.
    pub fn resolve_push(&self, challenge: PushChallenge, options: FlowOptions) -> Result<Flow> {
        self.ensure_fresh(challenge.token())?;
        info!(
            transaction_id = %challenge.transaction_id(),
            user_response = ?challenge.user_response(),
            "Resolving push challenge"
        );
        Ok(Flow::push(self.clone(), challenge, options))
    }
}
