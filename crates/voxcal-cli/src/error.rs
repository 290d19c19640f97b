//! CLI error types.

use thiserror::Error;
use voxcal_providers::{CalendarError, CredentialError, ProviderError};
use voxcal_store::StoreError;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The calendar must be connected (again) with `voxcal connect`.
    #[error("{0}; run `voxcal connect`")]
    AuthRequired(String),

    #[error(transparent)]
    Credential(CredentialError),

    #[error(transparent)]
    Calendar(CalendarError),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<CredentialError> for ClientError {
    fn from(err: CredentialError) -> Self {
        if err.is_reauth_required() {
            Self::AuthRequired(err.to_string())
        } else {
            Self::Credential(err)
        }
    }
}

impl From<CalendarError> for ClientError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::Credential(err) => err.into(),
            other => Self::Calendar(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reauth_errors_point_at_connect() {
        let err = ClientError::from(CredentialError::NotConnected {
            user_id: "me".to_string(),
        });
        assert!(matches!(err, ClientError::AuthRequired(_)));
        assert!(err.to_string().ends_with("run `voxcal connect`"));
    }

    #[test]
    fn provider_failures_pass_through() {
        let err = ClientError::from(CalendarError::Provider(ProviderError::server("boom")));
        assert!(matches!(err, ClientError::Calendar(_)));
    }
}
