//! In-memory store backend.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;
use voxcal_core::{ActionLogEntry, SessionPatch, TokenRecord, VoiceSessionRecord};

use crate::contracts::{ActionLog, BoxFuture, SessionStore, TokenStore};
use crate::error::{StoreError, StoreResult};

type SessionKey = (String, String);

/// A process-local store implementing every contract.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tokens: RwLock<HashMap<String, TokenRecord>>,
    actions: RwLock<Vec<ActionLogEntry>>,
    sessions: RwLock<HashMap<SessionKey, VoiceSessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the action log in insertion order.
    pub fn action_entries(&self) -> Vec<ActionLogEntry> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns a session record without going through the async contract.
    pub fn session(&self, user_id: &str, session_id: &str) -> Option<VoiceSessionRecord> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user_id.to_string(), session_id.to_string()))
            .cloned()
    }

    /// Returns the token record for a user without going through the async contract.
    pub fn token(&self, user_id: &str) -> Option<TokenRecord> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }
}

impl TokenStore for MemoryStore {
    fn get<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<TokenRecord>>> {
        Box::pin(async move { Ok(self.token(user_id)) })
    }

    fn upsert(&self, record: TokenRecord) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            debug!(user_id = %record.user_id, "upserting token record");
            self.tokens
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(record.user_id.clone(), record);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let removed = self
                .tokens
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(user_id)
                .is_some();
            Ok(removed)
        })
    }
}

impl ActionLog for MemoryStore {
    fn append(&self, entry: ActionLogEntry) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.actions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(entry);
            Ok(())
        })
    }
}

impl SessionStore for MemoryStore {
    fn insert_session(&self, record: VoiceSessionRecord) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let key = (record.user_id.clone(), record.session_id.clone());
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            if sessions.contains_key(&key) {
                return Err(StoreError::Conflict {
                    kind: "voice session",
                    key: format!("{}/{}", key.0, key.1),
                });
            }
            sessions.insert(key, record);
            Ok(())
        })
    }

    fn get_session<'a>(
        &'a self,
        user_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<VoiceSessionRecord>>> {
        Box::pin(async move { Ok(self.session(user_id, session_id)) })
    }

    fn update_session<'a>(
        &'a self,
        user_id: &'a str,
        session_id: &'a str,
        patch: SessionPatch,
    ) -> BoxFuture<'a, StoreResult<VoiceSessionRecord>> {
        Box::pin(async move {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let record = sessions
                .get_mut(&(user_id.to_string(), session_id.to_string()))
                .ok_or_else(|| StoreError::session_not_found(user_id, session_id))?;
            patch.apply(record);
            Ok(record.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use voxcal_core::ActionKind;

    #[tokio::test]
    async fn token_upsert_replaces_by_user() {
        let store = MemoryStore::new();
        let expires = Utc::now() + Duration::hours(1);

        store.upsert(TokenRecord::new("u1", "a1", "r1", expires)).await.unwrap();
        store.upsert(TokenRecord::new("u1", "a2", "r1", expires)).await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.access_token, "a2");
        assert!(store.get("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .upsert(TokenRecord::new("u1", "a", "r", Utc::now()))
            .await
            .unwrap();

        assert!(store.delete("u1").await.unwrap());
        assert!(!store.delete("u1").await.unwrap());
        assert!(store.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn action_log_appends_in_order() {
        let store = MemoryStore::new();
        store.append(ActionLogEntry::new("u1", ActionKind::List)).await.unwrap();
        store
            .append(ActionLogEntry::new("u1", ActionKind::Create).with_event_id("e1"))
            .await
            .unwrap();

        let entries = store.action_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ActionKind::List);
        assert_eq!(entries[1].event_id.as_deref(), Some("e1"));
    }

    #[tokio::test]
    async fn session_insert_conflicts_on_duplicate_id() {
        let store = MemoryStore::new();
        store.insert_session(VoiceSessionRecord::new("u1", "s1")).await.unwrap();

        let err = store
            .insert_session(VoiceSessionRecord::new("u1", "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn session_update_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_session("u1", "missing", SessionPatch::tool_calls(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn session_update_applies_patch_rules() {
        let store = MemoryStore::new();
        store.insert_session(VoiceSessionRecord::new("u1", "s1")).await.unwrap();

        store
            .update_session("u1", "s1", SessionPatch::tool_calls(2))
            .await
            .unwrap();
        let ended = store
            .update_session("u1", "s1", SessionPatch::ended(Some(1)))
            .await
            .unwrap();

        assert_eq!(ended.tool_calls_count, 2);
        assert!(ended.ended_at.is_some());
        assert_eq!(store.session("u1", "s1"), Some(ended));
    }
}
