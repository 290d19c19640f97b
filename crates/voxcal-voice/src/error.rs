//! Voice session error types.

use serde::Serialize;
use thiserror::Error;
use voxcal_core::ErrorKind;

/// A classified session failure, as surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Short user-facing title for the failure kind.
    pub fn title(&self) -> &'static str {
        self.kind.title()
    }
}

/// Failure of a voice-side collaborator (capture device, issuer, transport).
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("capture device unavailable: {0}")]
    Device(String),

    #[error("ephemeral credential request failed ({status}): {message}")]
    Issuer { status: u16, message: String },

    #[error("realtime transport failed: {0}")]
    Transport(String),

    #[error("request to realtime service failed")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from realtime service: {0}")]
    InvalidResponse(String),
}

impl VoiceError {
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Failure of a session event bridge request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("no active voice session")]
    NoActiveSession,

    /// The active session belongs to a different user.
    #[error("active voice session belongs to another user")]
    SessionMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_display() {
        let err = SessionError::new(ErrorKind::Microphone, "Permission denied");
        assert_eq!(err.to_string(), "microphone: Permission denied");
        assert_eq!(err.title(), "Microphone unavailable");
    }

    #[test]
    fn issuer_error_mentions_status() {
        let err = VoiceError::Issuer {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ephemeral credential request failed (401): Incorrect API key provided"
        );
    }
}
