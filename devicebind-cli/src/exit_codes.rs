//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts to tell a rejected challenge from an unreachable server.

use devicebind_core::{DeviceBindError, TransportError};

/// Successful execution.
#[allow(dead_code)]
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (malformed, expired or unverifiable challenge).
/// Maps to EX_DATAERR from sysexits.h.
pub const CHALLENGE_REJECTED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (network, authorization server).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// Marker attached to argument errors detected after parsing.
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = if err.chain().any(|e| e.is::<UsageError>()) {
            USAGE_ERROR
        } else if err.chain().any(|e| e.is::<std::io::Error>()) {
            INPUT_ERROR
        } else if let Some(core) = err.chain().find_map(|e| e.downcast_ref::<DeviceBindError>()) {
            classify(core)
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

fn classify(err: &DeviceBindError) -> i32 {
    match err {
        DeviceBindError::Token(_)
        | DeviceBindError::Protocol(_)
        | DeviceBindError::SerializationError(_) => CHALLENGE_REJECTED,
        DeviceBindError::Transport(TransportError::Decode(_)) => CHALLENGE_REJECTED,
        DeviceBindError::Transport(_) => NETWORK_ERROR,
        DeviceBindError::ConfigError(_) => USAGE_ERROR,
        _ => GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use devicebind_core::{ProtocolError, TokenError};

    #[test]
    fn test_token_errors_are_rejections() {
        let err = anyhow::Error::new(DeviceBindError::from(TokenError::Expired(
            "expired at 2024-01-01T00:00:00Z".into(),
        )))
            .context("Challenge validation failed");
        assert_eq!(ExitCode::from_anyhow(&err).code, CHALLENGE_REJECTED);
    }

    #[test]
    fn test_push_not_recognized_is_rejection() {
        let err = anyhow::Error::new(DeviceBindError::from(ProtocolError::PushNotRecognized(
            "unsupported payload version".into(),
        )));
        assert_eq!(ExitCode::from_anyhow(&err).code, CHALLENGE_REJECTED);
    }

    #[test]
    fn test_transport_errors_are_unavailable() {
        let err = anyhow::Error::new(DeviceBindError::from(TransportError::Network(
            "connection refused".into(),
        )));
        assert_eq!(ExitCode::from_anyhow(&err).code, NETWORK_ERROR);
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = std::fs::read("/nonexistent/devicebind/token")
            .context("Failed to read file")
            .unwrap_err();
        let exit = ExitCode::from_anyhow(&err);
        assert_eq!(exit.code, INPUT_ERROR);
        assert!(exit.message.unwrap().contains("Failed to read file"));
    }

    #[test]
    fn test_unclassified_errors_are_general() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::from_anyhow(&err).code, GENERAL_ERROR);
    }
}
