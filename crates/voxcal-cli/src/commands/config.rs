//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

pub fn path(config_path: &Path) -> ClientResult<()> {
    println!("config: {}", config_path.display());
    Ok(())
}

/// Prints the effective configuration. Secret references are shown as
/// written, unresolved.
pub fn dump(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {e}")))?;
    println!("# {}", config_path.display());
    println!("{rendered}");
    println!("# tokens: {}", config.token_path().display());
    Ok(())
}

pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    if config.user_id.trim().is_empty() {
        return Err(ClientError::config("user_id must not be empty"));
    }
    config.google.to_provider_config()?;
    println!("Configuration is valid.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleSettings;

    #[test]
    fn validate_rejects_blank_user() {
        let config = ClientConfig {
            user_id: " ".to_string(),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn validate_accepts_inline_client() {
        let config = ClientConfig {
            google: GoogleSettings {
                client_id: Some("id.apps.googleusercontent.com".to_string()),
                client_secret: Some("secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        validate(&config).unwrap();
    }
}
