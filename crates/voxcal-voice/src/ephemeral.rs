//! Ephemeral client credentials from the realtime sessions endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voxcal_store::BoxFuture;

use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::transport::{EphemeralCredential, EphemeralIssuer};

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    model: &'a str,
    voice: &'a str,
    instructions: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Exchanges the long-lived server API key for a per-session client secret.
pub struct HttpEphemeralIssuer {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    instructions: String,
}

impl std::fmt::Debug for HttpEphemeralIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEphemeralIssuer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpEphemeralIssuer {
    pub fn new(config: &VoiceConfig, api_key: impl Into<String>) -> Result<Self, VoiceError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http_client,
            endpoint: format!("{}/realtime/sessions", config.realtime_base_url),
            api_key: api_key.into(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            instructions: config.instructions.clone(),
        })
    }

    pub async fn request(&self) -> Result<EphemeralCredential, VoiceError> {
        let body = SessionRequest {
            model: &self.model,
            voice: &self.voice,
            instructions: &self.instructions,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text);
            warn!(%status, "realtime session request rejected");
            return Err(VoiceError::Issuer {
                status: status.as_u16(),
                message: match status {
                    reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                        format!("unauthorized: {message}")
                    }
                    _ => message,
                },
            });
        }

        let parsed: SessionResponse = serde_json::from_str(&text)
            .map_err(|e| VoiceError::InvalidResponse(e.to_string()))?;
        if parsed.client_secret.value.is_empty() {
            return Err(VoiceError::InvalidResponse(
                "empty client secret".to_string(),
            ));
        }

        let expires_at = parsed
            .client_secret
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        debug!(?expires_at, "issued ephemeral credential");

        Ok(EphemeralCredential {
            value: parsed.client_secret.value,
            expires_at,
        })
    }
}

impl EphemeralIssuer for HttpEphemeralIssuer {
    fn issue(&self) -> BoxFuture<'_, Result<EphemeralCredential, VoiceError>> {
        Box::pin(self.request())
    }
}

/// Pulls `error.message` out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
