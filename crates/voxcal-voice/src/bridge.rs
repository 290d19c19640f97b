//! Channel between agent tools and the session controller.
//!
//! The controller publishes the active session into a watch slot. A tool
//! that wants to end the conversation calls
//! [`SessionEventBridge::request_end`], which looks up the active session,
//! checks it belongs to the calling user, stamps its record as ended, and after [`BridgeConfig::end_signal_delay`]
//! broadcasts an [`EndSignal`]. The controller listens for the signal and
//! tears down.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use voxcal_core::SessionPatch;
use voxcal_store::SessionStore;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// The session currently published by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub user_id: String,
    pub session_id: String,
}

/// Request to terminate a specific session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndSignal {
    pub session_id: String,
}

/// Shared handle to the bridge. Clones refer to the same channel.
#[derive(Clone)]
pub struct SessionEventBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    active_tx: watch::Sender<Option<ActiveSession>>,
    end_tx: broadcast::Sender<EndSignal>,
    sessions: Arc<dyn SessionStore>,
    config: BridgeConfig,
}

impl std::fmt::Debug for SessionEventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEventBridge")
            .field("active", &*self.inner.active_tx.borrow())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SessionEventBridge {
    pub fn new(sessions: Arc<dyn SessionStore>, config: BridgeConfig) -> Self {
        let (active_tx, _) = watch::channel(None);
        let (end_tx, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(BridgeInner {
                active_tx,
                end_tx,
                sessions,
                config,
            }),
        }
    }

    /// Publishes `session` as the active one, replacing any previous value.
    pub fn publish(&self, session: ActiveSession) {
        debug!(session_id = %session.session_id, "publishing active session");
        self.inner.active_tx.send_replace(Some(session));
    }

    /// Returns the active session, if any.
    pub fn active_session(&self) -> Option<ActiveSession> {
        self.inner.active_tx.borrow().clone()
    }

    /// Clears the slot if it still holds `session_id`.
    ///
    /// Returns whether the slot was cleared.
    pub fn clear_session_if(&self, session_id: &str) -> bool {
        self.inner.active_tx.send_if_modified(|active| {
            if active.as_ref().is_some_and(|s| s.session_id == session_id) {
                *active = None;
                true
            } else {
                false
            }
        })
    }

    /// Watches the active-session slot.
    pub fn watch_active(&self) -> watch::Receiver<Option<ActiveSession>> {
        self.inner.active_tx.subscribe()
    }

    /// Subscribes to termination signals.
    pub fn subscribe(&self) -> broadcast::Receiver<EndSignal> {
        self.inner.end_tx.subscribe()
    }

    /// Ends the active session on behalf of `user_id`'s agent.
    ///
    /// Fails with [`BridgeError::SessionMismatch`] when the active session is
    /// another user's; nothing is stamped or signalled then. The session record is stamped ended before this returns; the
    /// termination signal follows after the configured delay. A failed
    /// bookkeeping write is logged and does not stop the signal.
    pub async fn request_end(&self, user_id: &str) -> Result<ActiveSession, BridgeError> {
        let active = self.active_session().ok_or(BridgeError::NoActiveSession)?;
        if active.user_id != user_id {
            warn!(
                user_id,
                session_id = %active.session_id,
                "refusing to end another user's session"
            );
            return Err(BridgeError::SessionMismatch);
        }

        if let Err(err) = self
            .inner
            .sessions
            .update_session(&active.user_id, &active.session_id, SessionPatch::ended(None))
            .await
        {
            warn!(
                session_id = %active.session_id,
                error = %err,
                "failed to record session end"
            );
        }

        info!(session_id = %active.session_id, "session end requested");

        let end_tx = self.inner.end_tx.clone();
        let delay = self.inner.config.end_signal_delay;
        let signal = EndSignal {
            session_id: active.session_id.clone(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if end_tx.send(signal).is_err() {
                debug!("end signal had no listeners");
            }
        });

        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voxcal_core::VoiceSessionRecord;
    use voxcal_store::MemoryStore;

    fn active(session_id: &str) -> ActiveSession {
        ActiveSession {
            user_id: "u1".to_string(),
            session_id: session_id.to_string(),
        }
    }

    fn bridge(store: Arc<MemoryStore>, delay: Duration) -> SessionEventBridge {
        SessionEventBridge::new(store, BridgeConfig::new(delay))
    }

    #[tokio::test]
    async fn clear_only_matching_session() {
        let bridge = bridge(Arc::new(MemoryStore::new()), Duration::ZERO);
        bridge.publish(active("s1"));

        assert!(!bridge.clear_session_if("s0"));
        assert_eq!(bridge.active_session(), Some(active("s1")));

        assert!(bridge.clear_session_if("s1"));
        assert_eq!(bridge.active_session(), None);
        assert!(!bridge.clear_session_if("s1"));
    }

    #[tokio::test]
    async fn request_end_without_session_fails() {
        let bridge = bridge(Arc::new(MemoryStore::new()), Duration::ZERO);
        assert_eq!(
            bridge.request_end("u1").await,
            Err(BridgeError::NoActiveSession)
        );
    }

    #[tokio::test]
    async fn request_end_stamps_record_then_signals() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_session(VoiceSessionRecord::new("u1", "s1"))
            .await
            .unwrap();
        let bridge = bridge(store.clone(), Duration::from_millis(30));
        let mut signals = bridge.subscribe();
        bridge.publish(active("s1"));

        let ended = bridge.request_end("u1").await.unwrap();
        assert_eq!(ended.session_id, "s1");
        assert!(store.session("u1", "s1").unwrap().ended_at.is_some());
        assert!(signals.try_recv().is_err());

        let signal = tokio::time::timeout(Duration::from_secs(2), signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.session_id, "s1");
    }

    #[tokio::test]
    async fn missing_record_still_signals() {
        let bridge = bridge(Arc::new(MemoryStore::new()), Duration::ZERO);
        let mut signals = bridge.subscribe();
        bridge.publish(active("ghost"));

        bridge.request_end("u1").await.unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(2), signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.session_id, "ghost");
    }

    #[tokio::test]
    async fn request_end_for_other_user_is_refused() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_session(VoiceSessionRecord::new("u2", "s-u2"))
            .await
            .unwrap();
        let bridge = bridge(store.clone(), Duration::ZERO);
        let mut signals = bridge.subscribe();
        bridge.publish(ActiveSession {
            user_id: "u2".to_string(),
            session_id: "s-u2".to_string(),
        });

        assert_eq!(
            bridge.request_end("u1").await,
            Err(BridgeError::SessionMismatch)
        );
        assert!(store.session("u2", "s-u2").unwrap().ended_at.is_none());
        assert_eq!(bridge.active_session().unwrap().session_id, "s-u2");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(signals.try_recv().is_err());
    }
}
