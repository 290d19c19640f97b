//! Google OAuth and Calendar endpoint configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};

/// OAuth 2.0 client credentials registered with Google Cloud Console.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Shape of the credentials JSON downloaded from Google Cloud Console.
///
/// Accepts the nested `installed`/`web` layout and the flat layout emitted
/// by gcloud.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Google Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read credentials file {}",
                path.display()
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from either supported JSON layout.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration("failed to parse credentials JSON").with_source(e)
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        match (file.client_id, file.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Self::new(client_id, client_secret)),
            _ => Err(ProviderError::configuration(
                "credentials must contain an 'installed'/'web' section or root-level client_id/client_secret",
            )),
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration shared by the OAuth client and the Calendar client.
///
/// Endpoint URLs are configurable so tests can point them at a local mock
/// server.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,
    /// Authorization endpoint used to build the consent URL.
    pub auth_url: String,
    /// Token endpoint for code exchange and refresh.
    pub token_url: String,
    /// Calendar API v3 base URL, without a trailing slash.
    pub api_base: String,
    /// Redirect URI registered for the OAuth client.
    pub redirect_uri: String,
    /// Calendar operated on when a request does not name one.
    pub calendar_id: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl GoogleConfig {
    pub const DEFAULT_AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    pub const DEFAULT_TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";
    /// Out-of-band loopback redirect; the user pastes the code back.
    pub const DEFAULT_REDIRECT_URI: &'static str = "http://127.0.0.1:8085/callback";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Read-write scope; the assistant creates and edits events.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar.events";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            auth_url: Self::DEFAULT_AUTH_URL.to_string(),
            token_url: Self::DEFAULT_TOKEN_URL.to_string(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            redirect_uri: Self::DEFAULT_REDIRECT_URI.to_string(),
            calendar_id: "primary".to_string(),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("voxcal/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn with_calendar_id(mut self, id: impl Into<String>) -> Self {
        self.calendar_id = id.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Builds the HTTP client used for both OAuth and Calendar requests.
    pub fn http_client(&self) -> ProviderResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::configuration("failed to build HTTP client").with_source(e))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {e}"))?;

        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }
        if self.calendar_id.is_empty() {
            return Err("calendar_id must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    #[test]
    fn credentials_validation() {
        assert!(test_credentials().validate().is_ok());
        assert!(OAuthCredentials::new("", "secret").validate().is_err());
        assert!(OAuthCredentials::new("bad-id", "secret").validate().is_err());
        assert!(
            OAuthCredentials::new("x.apps.googleusercontent.com", "")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn defaults_point_at_google() {
        let config = GoogleConfig::new(test_credentials());
        assert_eq!(config.token_url, GoogleConfig::DEFAULT_TOKEN_URL);
        assert_eq!(config.api_base, GoogleConfig::DEFAULT_API_BASE);
        assert_eq!(config.calendar_id, "primary");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let config = GoogleConfig::new(test_credentials()).with_api_base("http://127.0.0.1:9/");
        assert_eq!(config.api_base, "http://127.0.0.1:9");
    }

    #[test]
    fn empty_scopes_fail_validation() {
        let config = GoogleConfig::new(test_credentials()).with_scopes(vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn credentials_from_json_layouts() {
        let installed = r#"{"installed": {"client_id": "a.apps.googleusercontent.com", "client_secret": "s", "project_id": "p"}}"#;
        assert_eq!(
            OAuthCredentials::from_json(installed).unwrap().client_id,
            "a.apps.googleusercontent.com"
        );

        let flat = r#"{"client_id": "b.apps.googleusercontent.com", "client_secret": "t", "refresh_token": "r"}"#;
        assert_eq!(OAuthCredentials::from_json(flat).unwrap().client_secret, "t");
    }

    #[test]
    fn credentials_from_json_rejects_unknown_layout() {
        let err = OAuthCredentials::from_json(r#"{"other": {}}"#).unwrap_err();
        assert!(err.message().contains("client_id"));

        let err = OAuthCredentials::from_json("not json").unwrap_err();
        assert!(err.message().contains("parse"));
    }
}
