//! Error types for canalizar

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Rejected input, e.g. an unsupported upload extension.
    #[error("{0}")]
    Validation(String),

    /// Unknown dataset, training, result, model or milestone id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation not legal in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A collaborator call failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Stable machine-readable code for the wire payload.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// Convert into the `{message, code}` payload collaborators exchange.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            message: self.to_string(),
            code: Some(self.code().to_string()),
        }
    }
}

/// Typed error payload carried across the collaborator boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Validation("bad file".into()).code(), "VALIDATION_ERROR");
        assert_eq!(Error::NotFound("training-1".into()).code(), "NOT_FOUND");
        assert_eq!(Error::InvalidState("already done".into()).code(), "INVALID_STATE");
        assert_eq!(Error::Transport("refused".into()).code(), "TRANSPORT_ERROR");
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = Error::NotFound("run-7".into()).payload();
        let json = serde_json::to_string(&payload).unwrap();
        let back: ErrorPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message, "not found: run-7");
        assert_eq!(back.code.as_deref(), Some("NOT_FOUND"));
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidState("stop after completion".into());
        assert_eq!(err.to_string(), "invalid state: stop after completion");
    }
}
