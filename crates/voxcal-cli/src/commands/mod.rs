//! Subcommand implementations.

pub mod auth;
pub mod config;
pub mod events;
pub mod status;

use std::sync::Arc;

use voxcal_providers::google::{GoogleConfig, OAuthClient};
use voxcal_providers::{CredentialManager, CredentialPolicy};
use voxcal_store::FileTokenStore;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Provider configuration, OAuth client and credential manager built from
/// the client config.
pub struct Context {
    pub user_id: String,
    pub google: GoogleConfig,
    pub oauth: Arc<OAuthClient>,
    pub credentials: CredentialManager,
}

impl Context {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let google = config.google.to_provider_config()?;
        let oauth = Arc::new(OAuthClient::new(&google)?);
        let store = Arc::new(FileTokenStore::open(config.token_path())?);
        let credentials =
            CredentialManager::new(store, oauth.clone(), CredentialPolicy::default());

        Ok(Self {
            user_id: config.user_id.clone(),
            google,
            oauth,
            credentials,
        })
    }
}
