//! OAuth 2.0 authorization-code (PKCE) and refresh-token grants for Google.
//!
//! The consent step happens out of process: [`OAuthClient::authorization_url`]
//! yields a URL for the user's browser and the returned authorization code is
//! handed to [`OAuthClient::exchange_code`]. Refreshing a stored credential
//! goes through [`OAuthClient::refresh_token`], which reports a revoked or
//! expired refresh token as [`ProviderErrorCode::InvalidGrant`].
//!
//! [`ProviderErrorCode::InvalidGrant`]: crate::error::ProviderErrorCode::InvalidGrant

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::credentials::TokenRefresher;
use crate::error::{ProviderError, ProviderResult};
use crate::BoxFuture;

use super::config::{GoogleConfig, OAuthCredentials};

/// PKCE code verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Tokens issued by the token endpoint.
///
/// Every field is optional on the wire. A refresh response without an
/// access token is treated by the credential manager as an unusable grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Error body returned by the token endpoint (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth client for the Google token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    auth_url: String,
    token_url: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        Ok(Self::with_http_client(config, config.http_client()?))
    }

    pub fn with_http_client(config: &GoogleConfig, http_client: reqwest::Client) -> Self {
        Self {
            credentials: config.credentials.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            http_client,
        }
    }

    /// Builds the consent URL for a PKCE flow.
    pub fn authorization_url(&self, pkce: &PkceFlow, redirect_uri: &str, scopes: &[String]) -> String {
        pkce.build_auth_url(&self.auth_url, &self.credentials.client_id, redirect_uri, scopes)
    }

    /// Exchanges a refresh token for a new access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<TokenGrant> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let grant = self.post_token_request(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok(grant)
    }

    /// Exchanges an authorization code (with its PKCE verifier) for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<TokenGrant> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let grant = self.post_token_request(&params, "token exchange").await?;
        info!("obtained tokens from authorization code");
        Ok(grant)
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        context: &str,
    ) -> ProviderResult<TokenGrant> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(context, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest("failed to read token response", e))?;

        if !status.is_success() {
            return Err(token_error(context, status, &body));
        }

        debug!(%status, "{context} succeeded");
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {e}")).with_source(e)
        })
    }
}

impl TokenRefresher for OAuthClient {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        Box::pin(self.refresh_token(refresh_token))
    }
}

/// Maps a non-success token endpoint response to a provider error.
fn token_error(context: &str, status: reqwest::StatusCode, body: &str) -> ProviderError {
    let parsed: Option<TokenErrorResponse> = serde_json::from_str(body).ok();

    if let Some(err) = &parsed {
        if err.error == "invalid_grant" {
            let description = err
                .error_description
                .as_deref()
                .unwrap_or("refresh token expired or revoked");
            warn!(%status, "{context} rejected: invalid_grant");
            return ProviderError::invalid_grant(description.to_string());
        }
    }

    let detail = match &parsed {
        Some(err) => match &err.error_description {
            Some(description) => format!("{}: {description}", err.error),
            None => err.error.clone(),
        },
        None => body.trim().to_string(),
    };
    let message = format!("{context} failed ({status}): {detail}");

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ProviderError::rate_limited(message)
    } else if status.is_server_error() {
        ProviderError::server(message)
    } else if status == reqwest::StatusCode::BAD_REQUEST {
        ProviderError::bad_request(message)
    } else {
        ProviderError::authentication(message)
    }
}

/// PKCE verifier, challenge and CSRF state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    /// SHA-256 of the verifier, base64url without padding.
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the authorization URL. Requests offline access with forced
    /// consent so Google always issues a refresh token.
    pub fn build_auth_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        format!(
            "{auth_url}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}
