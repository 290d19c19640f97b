//! Store contracts.

use std::future::Future;
use std::pin::Pin;

use voxcal_core::{ActionLogEntry, SessionPatch, TokenRecord, VoiceSessionRecord};

use crate::error::StoreResult;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable storage of one [`TokenRecord`] per user.
pub trait TokenStore: Send + Sync {
    /// Returns the record for `user_id`, if any.
    fn get<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<TokenRecord>>>;

    /// Inserts or replaces the record keyed by `record.user_id`.
    fn upsert(&self, record: TokenRecord) -> BoxFuture<'_, StoreResult<()>>;

    /// Deletes the record for `user_id`.
    ///
    /// Returns whether a record existed. Deleting an absent record is not an error.
    fn delete<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<bool>>;
}

/// Append-only log of calendar operations.
pub trait ActionLog: Send + Sync {
    fn append(&self, entry: ActionLogEntry) -> BoxFuture<'_, StoreResult<()>>;
}

/// Storage of voice session bookkeeping.
pub trait SessionStore: Send + Sync {
    /// Inserts a new record; fails with `Conflict` if the session id is taken.
    fn insert_session(&self, record: VoiceSessionRecord) -> BoxFuture<'_, StoreResult<()>>;

    fn get_session<'a>(
        &'a self,
        user_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<VoiceSessionRecord>>>;

    /// Applies `patch` and returns the updated record.
    ///
    /// Fails with `NotFound` when no record matches; implementations must
    /// apply the patch through [`SessionPatch::apply`].
    fn update_session<'a>(
        &'a self,
        user_id: &'a str,
        session_id: &'a str,
        patch: SessionPatch,
    ) -> BoxFuture<'a, StoreResult<VoiceSessionRecord>>;
}
