use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keystore::KeyFailure;
use crate::policy::KeyType;

/// Failures while parsing or validating a challenge token.
///
/// All of these are terminal for the challenge that produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Unexpected token type: expected {expected}, got {actual:?}")]
    UnexpectedTokenType {
        expected: String,
        actual: Option<String>,
    },

    #[error("No verification key for kid '{0}'")]
    UnknownKeyId(String),

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token outside its validity window: {0}")]
    Expired(String),

    #[error("Missing required claim: {0}")]
    MissingClaim(String),
}

/// The last key read failure, surfaced once the key-type list is exhausted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{key_type} key unavailable ({reason}): {message}")]
pub struct KeyUnavailableError {
    pub key_type: KeyType,
    pub reason: KeyFailure,
    pub message: String,
}

/// Error body returned by the authorization server on a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_summary: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Server returned status {status}")]
    Status {
        status: u16,
        server_error: Option<ServerError>,
    },

    #[error("Server returned an empty body (status {status})")]
    EmptyBody { status: u16 },

    #[error("Failed to decode server response: {0}")]
    Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("No key types provided for this challenge")]
    NoKeyTypesProvided,

    #[error("No enrollment found for organization {org_id}")]
    AccountNotFound { org_id: String },

    #[error("{candidates} enrollments match organization {org_id} and account selection is not allowed")]
    AmbiguousAccount { org_id: String, candidates: usize },

    #[error("Enrollment {0} is not one of the offered accounts")]
    UnknownEnrollment(String),

    #[error("Enrollment already bound to this transaction")]
    EnrollmentAlreadyBound,

    #[error("A remediation step is still awaiting an answer")]
    StepOutstanding,

    #[error("No remediation step is awaiting an answer")]
    NoStepOutstanding,

    #[error("Answer does not match the outstanding {expected} step")]
    UnexpectedAnswer { expected: &'static str },

    #[error("Push challenges require an explicit approve or deny")]
    ResponseRequired,

    #[error("Push challenge already answered with {0}")]
    AlreadyResponded(String),

    #[error("Push notification not recognized: {0}")]
    PushNotRecognized(String),

    #[error("Challenge issuer {issuer:?} does not belong to organization {org_url}")]
    IssuerMismatch {
        issuer: Option<String>,
        org_url: String,
    },

    #[error("Verification flow already finished")]
    FlowFinished,
}

#[derive(Error, Debug)]
pub enum DeviceBindError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    KeyUnavailable(#[from] KeyUnavailableError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Signal collection error: {0}")]
    SignalError(String),

    #[error("Enrollment store error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DeviceBindError {
    /// True for errors that leave a flow usable (misuse of the step protocol).
    pub(crate) fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Protocol(
                ProtocolError::StepOutstanding
                    | ProtocolError::NoStepOutstanding
                    | ProtocolError::UnexpectedAnswer { .. }
                    | ProtocolError::UnknownEnrollment(_)
                    | ProtocolError::ResponseRequired
                    | ProtocolError::FlowFinished
            )
        )
    }
}

pub type Result<T> = std::result::Result<T, DeviceBindError>;
