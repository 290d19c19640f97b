//! Error types for calendar provider operations.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are invalid or expired (HTTP 401).
    AuthenticationFailed,
    /// The credential lacks permission (HTTP 403).
    AuthorizationFailed,
    /// The refresh token can no longer be exchanged (`invalid_grant`).
    InvalidGrant,
    /// Connection failed, timed out, or the body could not be read.
    NetworkError,
    /// Too many requests (HTTP 429).
    RateLimited,
    /// The server returned a 5xx status.
    ServerError,
    /// The response body did not have the expected shape.
    InvalidResponse,
    /// The resource does not exist (HTTP 404/410).
    NotFound,
    /// The request was rejected as malformed (HTTP 400).
    BadRequest,
    /// Missing or invalid configuration.
    ConfigurationError,
    /// Unexpected state or a bug.
    InternalError,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns true if the stored credential was rejected by the provider.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::AuthorizationFailed)
    }

    /// Returns a machine-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::InvalidGrant => "invalid_grant",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to the OAuth or Calendar endpoints.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidGrant, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Maps a transport-level `reqwest` failure.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("{context}: request timeout")
        } else if err.is_connect() {
            format!("{context}: connection failed: {err}")
        } else {
            format!("{context}: {err}")
        };
        Self::network(message).with_source(err)
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_retryable() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ServerError.is_retryable());
        assert!(!ProviderErrorCode::InvalidGrant.is_retryable());
        assert!(!ProviderErrorCode::AuthenticationFailed.is_retryable());
    }

    #[test]
    fn credential_rejection_codes() {
        assert!(ProviderErrorCode::AuthenticationFailed.is_credential_rejection());
        assert!(ProviderErrorCode::AuthorizationFailed.is_credential_rejection());
        assert!(!ProviderErrorCode::InvalidGrant.is_credential_rejection());
        assert!(!ProviderErrorCode::NotFound.is_credential_rejection());
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError::invalid_grant("Token has been expired or revoked.");
        assert_eq!(
            err.to_string(),
            "invalid_grant: Token has been expired or revoked."
        );
        assert_eq!(err.code(), ProviderErrorCode::InvalidGrant);
    }

    #[test]
    fn provider_error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = ProviderError::internal("failed to persist").with_source(io_err);
        assert!(err.source().is_some());
    }
}
