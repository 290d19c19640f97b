//! Google Calendar access for the voice assistant.
//!
//! - [`CredentialManager`] keeps each user's OAuth tokens valid, with
//!   single-flight refresh per user
//! - [`CalendarClientFactory`] hands out Calendar API clients bound to a
//!   user's current access token
//! - [`CalendarService`] runs event operations and records them in the
//!   action log
//! - [`google`] holds the OAuth and Calendar API wire clients
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use voxcal_providers::{CalendarClientFactory, CredentialManager, CredentialPolicy};
//! use voxcal_providers::google::{GoogleConfig, OAuthClient, OAuthCredentials};
//!
//! let config = GoogleConfig::new(OAuthCredentials::new(client_id, client_secret));
//! let manager = CredentialManager::new(store, Arc::new(OAuthClient::new(&config)?), CredentialPolicy::default());
//! let factory = CalendarClientFactory::from_config(manager, &config)?;
//! let calendar = factory.for_user("user-1").await?;
//! ```

pub mod calendar;
pub mod credentials;
pub mod error;
pub mod google;

pub use voxcal_store::BoxFuture;

pub use calendar::{
    CalendarClientFactory, CalendarError, CalendarHandle, CalendarResult, CalendarService,
};
pub use credentials::{
    ConnectionStatus, Credential, CredentialError, CredentialManager, CredentialPolicy,
    CredentialResult, TokenRefresher,
};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
