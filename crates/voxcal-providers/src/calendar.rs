//! Authenticated calendar access for a user.
//!
//! [`CalendarClientFactory`] turns a user id into a Calendar API client holding
//! a currently valid access token. [`CalendarService`] layers the operations
//! the assistant exposes on top of it: each successful mutation is appended to
//! the action log, and a 401/403 from the API evicts the stored credential.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use voxcal_core::{ActionKind, ActionLogEntry};
use voxcal_store::ActionLog;

use crate::credentials::{CredentialError, CredentialManager};
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::google::{
    CalendarEvent, EventDraft, EventPatch, GoogleCalendarClient, GoogleConfig, ListQuery,
};

/// Builds per-user Calendar API clients.
#[derive(Debug, Clone)]
pub struct CalendarClientFactory {
    credentials: CredentialManager,
    http_client: reqwest::Client,
    api_base: String,
}

/// A Calendar API client authenticated as one user.
#[derive(Debug, Clone)]
pub struct CalendarHandle {
    user_id: String,
    client: GoogleCalendarClient,
}

impl CalendarHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn client(&self) -> &GoogleCalendarClient {
        &self.client
    }
}

impl CalendarClientFactory {
    pub fn new(
        credentials: CredentialManager,
        http_client: reqwest::Client,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            http_client,
            api_base: api_base.into(),
        }
    }

    pub fn from_config(credentials: CredentialManager, config: &GoogleConfig) -> ProviderResult<Self> {
        Ok(Self::new(credentials, config.http_client()?, config.api_base.clone()))
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Returns a client for `user_id`, refreshing the access token if needed.
    ///
    /// Fails with [`CredentialError`] when no usable credential exists; the
    /// refresh rules of [`CredentialManager::get_valid_token`] apply.
    pub async fn for_user(&self, user_id: &str) -> Result<CalendarHandle, CredentialError> {
        let credential = self.credentials.get_valid_token(user_id).await?;
        debug!(user_id, "built calendar client");
        Ok(CalendarHandle {
            user_id: user_id.to_string(),
            client: GoogleCalendarClient::new(
                self.http_client.clone(),
                self.api_base.clone(),
                credential.access_token,
            ),
        })
    }
}

/// Failure of a calendar operation.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl CalendarError {
    /// The user must reconnect their calendar before retrying.
    pub fn is_reauth_required(&self) -> bool {
        match self {
            Self::Credential(err) => err.is_reauth_required(),
            Self::Provider(_) => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Credential(err) => err.is_retryable(),
            Self::Provider(err) => err.is_retryable(),
        }
    }
}

pub type CalendarResult<T> = Result<T, CalendarError>;

/// Calendar operations on behalf of a user, with action logging.
#[derive(Clone)]
pub struct CalendarService {
    factory: CalendarClientFactory,
    action_log: Arc<dyn ActionLog>,
    calendar_id: String,
}

impl std::fmt::Debug for CalendarService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarService")
            .field("factory", &self.factory)
            .field("calendar_id", &self.calendar_id)
            .finish_non_exhaustive()
    }
}

impl CalendarService {
    pub fn new(
        factory: CalendarClientFactory,
        action_log: Arc<dyn ActionLog>,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            action_log,
            calendar_id: calendar_id.into(),
        }
    }

    pub fn factory(&self) -> &CalendarClientFactory {
        &self.factory
    }

    pub async fn list_events(
        &self,
        user_id: &str,
        query: &ListQuery,
    ) -> CalendarResult<Vec<CalendarEvent>> {
        let handle = self.factory.for_user(user_id).await?;
        let result = handle.client().list_events(&self.calendar_id, query).await;
        let events = self.check(user_id, result).await?;

        self.record(
            ActionLogEntry::new(user_id, ActionKind::List)
                .with_details(json!({ "count": events.len(), "query": query })),
        )
        .await;
        Ok(events)
    }

    pub async fn create_event(
        &self,
        user_id: &str,
        draft: &EventDraft,
    ) -> CalendarResult<CalendarEvent> {
        let handle = self.factory.for_user(user_id).await?;
        let result = handle.client().create_event(&self.calendar_id, draft).await;
        let event = self.check(user_id, result).await?;

        self.record(
            ActionLogEntry::new(user_id, ActionKind::Create)
                .with_event_id(&event.id)
                .with_details(json!({ "summary": draft.summary, "start": draft.start })),
        )
        .await;
        Ok(event)
    }

    pub async fn update_event(
        &self,
        user_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> CalendarResult<CalendarEvent> {
        let handle = self.factory.for_user(user_id).await?;
        let result = handle
            .client()
            .update_event(&self.calendar_id, event_id, patch)
            .await;
        let event = self.check(user_id, result).await?;

        self.record(
            ActionLogEntry::new(user_id, ActionKind::Update)
                .with_event_id(event_id)
                .with_details(json!({ "changes": patch })),
        )
        .await;
        Ok(event)
    }

    pub async fn delete_event(&self, user_id: &str, event_id: &str) -> CalendarResult<()> {
        let handle = self.factory.for_user(user_id).await?;
        let result = handle
            .client()
            .delete_event(&self.calendar_id, event_id)
            .await;
        self.check(user_id, result).await?;

        self.record(ActionLogEntry::new(user_id, ActionKind::Delete).with_event_id(event_id))
            .await;
        Ok(())
    }

    /// Converts a rejected access token into an evicted credential.
    async fn check<T>(&self, user_id: &str, result: ProviderResult<T>) -> CalendarResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err)
                if err.code().is_credential_rejection()
                    || err.code() == ProviderErrorCode::InvalidGrant =>
            {
                let evicted = self
                    .factory
                    .credentials()
                    .invalidate(user_id, err.message())
                    .await;
                Err(evicted.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Appends to the action log. A log failure does not fail the operation.
    async fn record(&self, entry: ActionLogEntry) {
        let action = entry.action;
        if let Err(err) = self.action_log.append(entry).await {
            warn!(action = %action, error = %err, "failed to append action log entry");
        }
    }
}
