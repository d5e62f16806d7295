use serde::Serialize;
use thiserror::Error;

use crate::tracks::TrackKind;

/// Error triple reported by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
    pub explanation: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            explanation: explanation.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("access token is required")]
    InvalidCredential,
    #[error("no camera is supported on this device")]
    DeviceUnavailable,
    #[error("a session is already active")]
    SessionActive,
    #[error("connect failed: {0}")]
    EngineConnectFailure(EngineError),
    #[error("{kind} track publication failed: {error}")]
    PublicationFailure { kind: TrackKind, error: EngineError },
    #[error("{kind} track {track_sid} subscription failed: {error}")]
    SubscriptionFailure {
        kind: TrackKind,
        track_sid: String,
        error: EngineError,
    },
    #[error("invalid binary payload: {0}")]
    DecodeFailure(String),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "InvalidCredential",
            Self::DeviceUnavailable => "DeviceUnavailable",
            Self::SessionActive => "SessionActive",
            Self::EngineConnectFailure(_) => "EngineConnectFailure",
            Self::PublicationFailure { .. } => "PublicationFailure",
            Self::SubscriptionFailure { .. } => "SubscriptionFailure",
            Self::DecodeFailure(_) => "DecodeFailure",
        }
    }

    fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::EngineConnectFailure(e) => Some(e),
            Self::PublicationFailure { error, .. } | Self::SubscriptionFailure { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }
}

/// Error payload carried by events. Errors never cross the controller
/// boundary any other way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub kind: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_explanation: Option<String>,
}

impl From<&SessionError> for ErrorDetail {
    fn from(err: &SessionError) -> Self {
        let engine = err.engine_error();
        Self {
            kind: err.kind().to_string(),
            // Engine failures surface the engine's own message, as hosts expect.
            error: engine.map(|e| e.message.clone()).unwrap_or_else(|| err.to_string()),
            code: engine.map(|e| e.code.to_string()),
            error_explanation: engine.map(|e| e.explanation.clone()),
        }
    }
}

impl From<&EngineError> for ErrorDetail {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: "EngineError".to_string(),
            error: err.message.clone(),
            code: Some(err.code.to_string()),
            error_explanation: Some(err.explanation.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credential_detail_has_no_code() {
        let detail = ErrorDetail::from(&SessionError::InvalidCredential);
        assert_eq!(detail.kind, "InvalidCredential");
        assert_eq!(detail.error, "access token is required");
        assert!(detail.code.is_none());
    }

    #[test]
    fn engine_failure_detail_carries_triple() {
        let err = SessionError::EngineConnectFailure(EngineError::new(
            53000,
            "Signaling connection error",
            "Raised whenever a signaling connection error occurs",
        ));
        let detail = ErrorDetail::from(&err);
        assert_eq!(detail.kind, "EngineConnectFailure");
        assert_eq!(detail.error, "Signaling connection error");
        assert_eq!(detail.code.as_deref(), Some("53000"));
        assert!(detail.error_explanation.unwrap().starts_with("Raised"));
    }

    #[test]
    fn detail_serializes_camel_case() {
        let detail = ErrorDetail::from(&EngineError::new(1, "boom", "why"));
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["errorExplanation"], "why");
        assert_eq!(json["code"], "1");
    }
}
