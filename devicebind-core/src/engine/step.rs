//! Steps handed to the application and the answers it returns.

use serde_json::Value;

use crate::consent::UserConsentValue;
use crate::enrollment::Enrollment;
use crate::keystore::KeyFailure;
use crate::policy::KeyType;
use crate::signals::DeviceSignalSnapshot;
use crate::token::ChallengeContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCandidate {
    pub enrollment_id: String,
    pub user_id: String,
    pub username: Option<String>,
}

impl From<&Enrollment> for AccountCandidate {
    fn from(enrollment: &Enrollment) -> Self {
        Self {
            enrollment_id: enrollment.enrollment_id.clone(),
            user_id: enrollment.user_id.clone(),
            username: enrollment.username.clone(),
        }
    }
}

/// Several enrollments match the challenge's organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSelection {
    pub org_id: String,
    pub candidates: Vec<AccountCandidate>,
}

/// What to show the user when asking them to approve the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentPrompt {
    pub transaction_id: String,
    pub app_instance_name: Option<String>,
    pub context: ChallengeContext,
    /// True for push challenges, which need an explicit approve or deny.
    pub push: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRequest {
    pub names: Vec<String>,
}

/// Informational notice; the flow continues on the next call without an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationMessage {
    pub skipped: KeyType,
    pub reason: KeyFailure,
    pub next: Option<KeyType>,
    pub consent: UserConsentValue,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationStep {
    SelectAccount(AccountSelection),
    UserConsent(ConsentPrompt),
    DeviceSignals(SignalRequest),
    Message(RemediationMessage),
}

impl RemediationStep {
    /// Interactive steps suspend the flow until [`StepAnswer`] is supplied.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, Self::Message(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectAccount(_) => "selectAccount",
            Self::UserConsent(_) => "userConsent",
            Self::DeviceSignals(_) => "deviceSignals",
            Self::Message(_) => "message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentResponse {
    Approved,
    Denied,
    NoResponse,
}

impl From<ConsentResponse> for UserConsentValue {
    fn from(response: ConsentResponse) -> Self {
        match response {
            ConsentResponse::Approved => Self::Approved,
            ConsentResponse::Denied => Self::Denied,
            ConsentResponse::NoResponse => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepAnswer {
    Account { enrollment_id: String },
    Consent(ConsentResponse),
    /// `None` when the application has no signals to add.
    Signals(Option<DeviceSignalSnapshot>),
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub transaction_id: String,
    pub consent: UserConsentValue,
    pub key_type: KeyType,
    pub status: u16,
    /// Server response, or the raw text when it is not JSON
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Step(RemediationStep),
    Completed(VerificationOutcome),
}
