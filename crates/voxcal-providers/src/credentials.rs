//! Per-user OAuth credential lifecycle.
//!
//! [`CredentialManager::get_valid_token`] returns a usable access token for a
//! user, refreshing it when it is within the stale margin of expiry. Refreshes
//! are single-flight per user: concurrent callers for the same user share one
//! refresh request, while callers for different users never wait on each
//! other.
//!
//! A refresh token the provider no longer accepts (`invalid_grant`, or a grant
//! without an access token) evicts the stored record and surfaces
//! [`CredentialError::ReauthRequired`]. The user keeps getting that error,
//! rather than [`CredentialError::NotConnected`], until a new authorization is
//! stored with [`CredentialManager::store_initial`] or the credential is
//! deleted. Every other failure leaves the record in place.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures_util::future::{FutureExt, Shared};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use voxcal_core::{DEFAULT_STALE_MARGIN_SECS, TokenRecord};
use voxcal_store::TokenStore;

use crate::BoxFuture;
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::google::TokenGrant;

/// Exchanges a refresh token for a new grant.
///
/// Implementations report a dead refresh token as
/// [`ProviderErrorCode::InvalidGrant`].
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<TokenGrant>>;
}

/// Timing policy for token freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPolicy {
    /// A token expiring sooner than this is refreshed before use.
    pub stale_margin: Duration,
    /// Lifetime assumed when a grant omits `expires_in`.
    pub default_lifetime: Duration,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            stale_margin: Duration::seconds(DEFAULT_STALE_MARGIN_SECS),
            default_lifetime: Duration::hours(1),
        }
    }
}

impl CredentialPolicy {
    pub fn with_stale_margin(mut self, margin: Duration) -> Self {
        self.stale_margin = margin;
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }
}

/// A usable token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&TokenRecord> for Credential {
    fn from(record: &TokenRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
            expires_at: record.expires_at,
        }
    }
}

/// Whether a user has a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    NotConnected,
    Connected {
        expires_at: DateTime<Utc>,
        /// The access token will be refreshed on next use.
        stale: bool,
    },
}

/// Failure to produce a usable credential.
///
/// Cloneable so one refresh outcome can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("no calendar credential on file for user {user_id}")]
    NotConnected { user_id: String },

    #[error("calendar authorization for user {user_id} is no longer valid; reconnect required")]
    ReauthRequired { user_id: String },

    #[error("token refresh failed ({code}): {message}")]
    Refresh {
        code: ProviderErrorCode,
        message: String,
    },

    #[error("credential store error: {0}")]
    Store(String),
}

impl CredentialError {
    /// The user must reconnect their calendar account.
    pub fn is_reauth_required(&self) -> bool {
        matches!(self, Self::ReauthRequired { .. } | Self::NotConnected { .. })
    }

    /// The operation may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Refresh { code, .. } => code.is_retryable(),
            Self::Store(_) => true,
            Self::NotConnected { .. } | Self::ReauthRequired { .. } => false,
        }
    }

    fn refresh_failed(err: &ProviderError) -> Self {
        Self::Refresh {
            code: err.code(),
            message: err.message().to_string(),
        }
    }

    fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

pub type CredentialResult<T> = Result<T, CredentialError>;

type SharedRefresh = Shared<BoxFuture<'static, CredentialResult<Credential>>>;

/// Owns stored credentials and their refresh.
///
/// Cheap to clone; clones share the in-flight refresh table.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    policy: CredentialPolicy,
    in_flight: Mutex<HashMap<String, SharedRefresh>>,
    /// Users whose credential was evicted after the provider rejected it.
    evicted: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        policy: CredentialPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                policy,
                in_flight: Mutex::new(HashMap::new()),
                evicted: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn policy(&self) -> CredentialPolicy {
        self.inner.policy
    }

    /// Returns a fresh access token for `user_id`, refreshing if stale.
    ///
    /// Concurrent calls for the same user coalesce onto one refresh. The
    /// refresh runs on its own task, so it completes and is persisted even
    /// if every caller is cancelled.
    pub async fn get_valid_token(&self, user_id: &str) -> CredentialResult<Credential> {
        let record = self.inner.load(user_id).await?;
        if !record.is_stale(self.inner.policy.stale_margin) {
            return Ok(Credential::from(&record));
        }

        debug!(user_id, "access token is stale");
        self.refresh_coalesced(user_id).await
    }

    fn refresh_coalesced(&self, user_id: &str) -> SharedRefresh {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(user_id) {
            debug!(user_id, "joining in-flight refresh");
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let owner = user_id.to_string();
        // The entry is inserted below while the table lock is still held, so
        // the task's removal always happens after the insert.
        let task = tokio::spawn(async move {
            let result = inner.refresh(&owner).await;
            inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&owner);
            result
        });

        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(CredentialError::Refresh {
                    code: ProviderErrorCode::InternalError,
                    message: format!("refresh task failed: {e}"),
                })
            })
        }
        .boxed()
        .shared();

        in_flight.insert(user_id.to_string(), shared.clone());
        shared
    }

    /// Stores the tokens from an initial authorization-code exchange.
    ///
    /// Google omits the refresh token when the user re-consents without
    /// `prompt=consent`; an existing refresh token is kept in that case.
    /// Without any refresh token the connection cannot be kept alive and the
    /// user must re-authorize.
    pub async fn store_initial(
        &self,
        user_id: &str,
        grant: TokenGrant,
    ) -> CredentialResult<Credential> {
        let existing = self
            .inner
            .store
            .get(user_id)
            .await
            .map_err(CredentialError::store)?;

        let reauth = || CredentialError::ReauthRequired {
            user_id: user_id.to_string(),
        };

        let Some(access_token) = grant.access_token.filter(|t| !t.is_empty()) else {
            warn!(user_id, "authorization response carried no access token");
            return Err(reauth());
        };

        let Some(refresh_token) = grant
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| existing.as_ref().map(|r| r.refresh_token.clone()))
        else {
            warn!(user_id, "authorization response carried no refresh token");
            return Err(reauth());
        };

        let expires_at = self.inner.expiry_from(grant.expires_in);
        let mut record = TokenRecord::new(user_id, access_token, refresh_token, expires_at);
        if let Some(existing) = existing {
            record.created_at = existing.created_at;
        }

        self.inner
            .store
            .upsert(record.clone())
            .await
            .map_err(CredentialError::store)?;

        self.inner.clear_evicted(user_id);
        info!(user_id, %expires_at, "stored calendar credential");
        Ok(Credential::from(&record))
    }

    /// Removes the stored credential. Idempotent.
    pub async fn delete_credential(&self, user_id: &str) -> CredentialResult<()> {
        let existed = self
            .inner
            .store
            .delete(user_id)
            .await
            .map_err(CredentialError::store)?;
        self.inner.clear_evicted(user_id);
        if existed {
            info!(user_id, "deleted calendar credential");
        }
        Ok(())
    }

    /// Evicts a credential the provider rejected on an API call.
    ///
    /// Returns the error the caller should surface.
    pub async fn invalidate(&self, user_id: &str, reason: &str) -> CredentialError {
        self.inner.evict(user_id, reason).await
    }

    pub async fn connection_status(&self, user_id: &str) -> CredentialResult<ConnectionStatus> {
        let record = self
            .inner
            .store
            .get(user_id)
            .await
            .map_err(CredentialError::store)?;

        Ok(match record {
            None => ConnectionStatus::NotConnected,
            Some(record) => ConnectionStatus::Connected {
                expires_at: record.expires_at,
                stale: record.is_stale(self.inner.policy.stale_margin),
            },
        })
    }
}

impl Inner {
    async fn load(&self, user_id: &str) -> CredentialResult<TokenRecord> {
        self.store
            .get(user_id)
            .await
            .map_err(CredentialError::store)?
            .ok_or_else(|| {
                let user_id = user_id.to_string();
                if self.is_evicted(&user_id) {
                    CredentialError::ReauthRequired { user_id }
                } else {
                    CredentialError::NotConnected { user_id }
                }
            })
    }

    fn evicted(&self) -> MutexGuard<'_, HashSet<String>> {
        self.evicted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_evicted(&self, user_id: &str) -> bool {
        self.evicted().contains(user_id)
    }

    fn clear_evicted(&self, user_id: &str) {
        self.evicted().remove(user_id);
    }

    fn expiry_from(&self, expires_in: Option<i64>) -> DateTime<Utc> {
        let lifetime = expires_in
            .filter(|secs| *secs > 0)
            .map(Duration::seconds)
            .unwrap_or(self.policy.default_lifetime);
        Utc::now() + lifetime
    }

    async fn refresh(&self, user_id: &str) -> CredentialResult<Credential> {
        // Another refresh may have landed between the caller's read and now.
        let mut record = self.load(user_id).await?;
        if !record.is_stale(self.policy.stale_margin) {
            debug!(user_id, "token already refreshed");
            return Ok(Credential::from(&record));
        }

        if record.refresh_token.is_empty() {
            return Err(self.evict(user_id, "no refresh token on file").await);
        }

        info!(user_id, "refreshing access token");
        let grant = match self.refresher.refresh(&record.refresh_token).await {
            Ok(grant) => grant,
            Err(err) if err.code() == ProviderErrorCode::InvalidGrant => {
                return Err(self.evict(user_id, err.message()).await);
            }
            Err(err) => {
                warn!(user_id, error = %err, "token refresh failed");
                return Err(CredentialError::refresh_failed(&err));
            }
        };

        let Some(access_token) = grant.access_token.filter(|t| !t.is_empty()) else {
            return Err(self
                .evict(user_id, "refresh response carried no access token")
                .await);
        };

        let expires_at = self.expiry_from(grant.expires_in);
        let rotated = grant.refresh_token.filter(|t| !t.is_empty());
        if rotated.is_some() {
            debug!(user_id, "provider rotated refresh token");
        }
        record.apply_refresh(access_token, rotated, expires_at);

        if let Err(err) = self.store.upsert(record.clone()).await {
            warn!(user_id, error = %err, "failed to persist refreshed token");
            return Err(CredentialError::store(err));
        }

        info!(user_id, %expires_at, "access token refreshed");
        Ok(Credential::from(&record))
    }

    async fn evict(&self, user_id: &str, reason: &str) -> CredentialError {
        warn!(user_id, reason, "calendar credential rejected, removing it");
        self.evicted().insert(user_id.to_string());
        if let Err(err) = self.store.delete(user_id).await {
            warn!(user_id, error = %err, "failed to remove rejected credential");
        }
        CredentialError::ReauthRequired {
            user_id: user_id.to_string(),
        }
    }
}
