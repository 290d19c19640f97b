//! Client configuration.
//!
//! All settings live in one `config.toml`, by default at
//! `~/.config/voxcal/config.toml`. The OAuth client values accept secret
//! references (see [`crate::secret`]).
//!
//! ```toml
//! user_id = "me"
//!
//! [google]
//! client_id = "env::GOOGLE_CLIENT_ID"
//! client_secret = "env::GOOGLE_CLIENT_SECRET"
//! calendar_id = "primary"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use voxcal_providers::google::{GoogleConfig, OAuthCredentials};

use crate::error::{ClientError, ClientResult};

/// User id the CLI stores its own tokens under.
pub const DEFAULT_USER_ID: &str = "local";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Key for the token record in the token file.
    pub user_id: String,

    pub debug: bool,

    pub google: GoogleSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID.to_string(),
            debug: false,
            google: GoogleSettings::default(),
        }
    }
}

/// Google OAuth client and calendar settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Supports `env::` and `pass::` references.
    pub client_id: Option<String>,
    /// Supports `env::` and `pass::` references.
    pub client_secret: Option<String>,
    /// Client secrets JSON downloaded from the Google Cloud Console, used
    /// when `client_id`/`client_secret` are not set.
    pub credentials_file: Option<PathBuf>,
    pub calendar_id: Option<String>,
    pub redirect_uri: Option<String>,
    /// Where tokens are stored; defaults to the data directory.
    pub token_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads the default config file, or defaults if it does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxcal")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxcal")
    }

    pub fn token_path(&self) -> PathBuf {
        self.google
            .token_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("tokens.json"))
    }
}

impl GoogleSettings {
    /// Resolves the OAuth client, expanding secret references.
    ///
    /// Inline `client_id`/`client_secret` take precedence over
    /// `credentials_file`.
    pub fn resolve_credentials(&self) -> ClientResult<OAuthCredentials> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => {
                let id = crate::secret::resolve(id)
                    .map_err(|e| ClientError::config(format!("client_id: {e}")))?;
                let secret = crate::secret::resolve(secret)
                    .map_err(|e| ClientError::config(format!("client_secret: {e}")))?;
                Ok(OAuthCredentials::new(id, secret))
            }
            (Some(_), None) => Err(ClientError::config(
                "client_secret is missing from the [google] section",
            )),
            (None, Some(_)) => Err(ClientError::config(
                "client_id is missing from the [google] section",
            )),
            (None, None) => match self.credentials_file {
                Some(ref path) => Ok(OAuthCredentials::from_file(path)?),
                None => Err(ClientError::config(format!(
                    "Google OAuth client not configured. Add to {}:\n  \
                     [google]\n  \
                     client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                     client_secret = \"env::GOOGLE_CLIENT_SECRET\"",
                    ClientConfig::default_path().display()
                ))),
            },
        }
    }

    /// Builds the provider configuration.
    pub fn to_provider_config(&self) -> ClientResult<GoogleConfig> {
        let mut config = GoogleConfig::new(self.resolve_credentials()?);
        if let Some(ref calendar_id) = self.calendar_id {
            config = config.with_calendar_id(calendar_id);
        }
        if let Some(ref uri) = self.redirect_uri {
            config = config.with_redirect_uri(uri);
        }
        config.validate().map_err(ClientError::Config)?;
        Ok(config)
    }
}
