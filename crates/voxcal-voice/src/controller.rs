//! Voice session lifecycle.
//!
//! ```text
//!   idle ──connect──▶ connecting ──ready──▶ connected
//!     ▲                   │                     │
//!     │                 error                 error
//!     │                   ▼                     ▼
//!     └────disconnect──── error ◀───────────────┘
//! ```
//!
//! Every entry point (user action, connection event, bridge signal, drop)
//! re-checks the state it acts on at the time it runs. Each `connect`
//! starts a new epoch and `disconnect` bumps it, so work belonging to an
//! older epoch (a slow startup step, a late `ready`, an error from a
//! closing connection) is discarded instead of reviving a torn-down
//! session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voxcal_core::{ErrorKind, RawError, SessionPatch, VoiceSessionRecord, classify, normalize_error};
use voxcal_store::SessionStore;

use crate::bridge::{ActiveSession, EndSignal, SessionEventBridge};
use crate::config::VoiceConfig;
use crate::error::SessionError;
use crate::transport::{
    CaptureDevice, ConnectionEvent, EphemeralIssuer, HistoryItem, RealtimeConnection,
    RealtimeTransport, SessionHooks, count_tool_calls,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Error,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub error: Option<SessionError>,
    pub session_id: Option<String>,
    pub tool_calls: u32,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            error: None,
            session_id: None,
            tool_calls: 0,
        }
    }
}

/// Collaborators of a [`VoiceSessionController`].
#[derive(Clone)]
pub struct VoiceDeps {
    pub capture: Arc<dyn CaptureDevice>,
    pub issuer: Arc<dyn EphemeralIssuer>,
    pub transport: Arc<dyn RealtimeTransport>,
    pub sessions: Arc<dyn SessionStore>,
    pub hooks: Arc<dyn SessionHooks>,
}

struct SessionState {
    status: SessionStatus,
    error: Option<SessionError>,
    connection: Option<Arc<dyn RealtimeConnection>>,
    session_id: Option<String>,
    tool_calls: u32,
    /// Set while a teardown is in progress, cleared after the grace delay.
    closing: bool,
    chime_played: bool,
    epoch: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            error: self.error.clone(),
            session_id: self.session_id.clone(),
            tool_calls: self.tool_calls,
        }
    }

    fn is_quiescent(&self) -> bool {
        self.status == SessionStatus::Idle
            && self.connection.is_none()
            && self.session_id.is_none()
    }
}

/// Owns one user's voice session.
///
/// Must be created inside a Tokio runtime. Dropping the controller tears
/// the session down in the background.
pub struct VoiceSessionController {
    inner: Arc<ControllerInner>,
    end_listener: JoinHandle<()>,
}

struct ControllerInner {
    user_id: String,
    deps: VoiceDeps,
    bridge: SessionEventBridge,
    config: VoiceConfig,
    state: Mutex<SessionState>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl VoiceSessionController {
    pub fn new(
        user_id: impl Into<String>,
        deps: VoiceDeps,
        bridge: SessionEventBridge,
        config: VoiceConfig,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::idle());
        let end_signals = bridge.subscribe();
        let inner = Arc::new(ControllerInner {
            user_id: user_id.into(),
            deps,
            bridge,
            config,
            state: Mutex::new(SessionState {
                status: SessionStatus::Idle,
                error: None,
                connection: None,
                session_id: None,
                tool_calls: 0,
                closing: false,
                chime_played: false,
                epoch: 0,
            }),
            snapshot_tx,
        });

        let end_listener = tokio::spawn(listen_for_end(Arc::downgrade(&inner), end_signals));
        Self {
            inner,
            end_listener,
        }
    }

    /// Starts a session.
    ///
    /// No-op while connecting or connected; from `error` the failed session
    /// is torn down first. Returns the classified failure of a startup step.
    /// A startup overtaken by `disconnect` returns `Ok` and leaves the
    /// controller idle.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.inner.connect().await
    }

    /// Tears the session down. Idempotent; never fails.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot()
    }

    /// Watches state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }
}

impl std::fmt::Debug for VoiceSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSessionController")
            .field("user_id", &self.inner.user_id)
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Drop for VoiceSessionController {
    fn drop(&mut self) {
        self.end_listener.abort();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move { inner.disconnect().await });
            }
            Err(_) => {
                if !self.inner.lock().is_quiescent() {
                    warn!(user_id = %self.inner.user_id, "controller dropped outside a runtime; session not torn down");
                }
            }
        }
    }
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    async fn connect(self: &Arc<Self>) -> Result<(), SessionError> {
        let failed = self.lock().status == SessionStatus::Error;
        if failed {
            debug!(user_id = %self.user_id, "clearing failed session before reconnect");
            self.disconnect().await;
        }

        let epoch = {
            let mut state = self.lock();
            if state.status != SessionStatus::Idle {
                debug!(user_id = %self.user_id, status = ?state.status, "session already active");
                return Ok(());
            }
            state.epoch += 1;
            state.status = SessionStatus::Connecting;
            state.error = None;
            state.tool_calls = 0;
            state.closing = false;
            state.chime_played = false;
            self.publish(&state);
            state.epoch
        };
        info!(user_id = %self.user_id, epoch, "starting voice session");

        if let Err(err) = self.deps.capture.acquire().await {
            let message = normalize_error(RawError::Error(&err));
            return self.fail(epoch, SessionError::new(ErrorKind::Microphone, message));
        }
        if !self.is_current(epoch) {
            return self.superseded(epoch);
        }

        let credential = match self.deps.issuer.issue().await {
            Ok(credential) => credential,
            Err(err) => {
                let (kind, message) = classify(RawError::Error(&err), Some(ErrorKind::Credential));
                return self.fail(epoch, SessionError::new(kind, message));
            }
        };
        if !self.is_current(epoch) {
            return self.superseded(epoch);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let record = VoiceSessionRecord::new(&self.user_id, &session_id);
        if let Err(err) = self.deps.sessions.insert_session(record).await {
            warn!(user_id = %self.user_id, %session_id, error = %err, "failed to create session record");
        }
        // The bridge slot is filled under the state lock so a teardown that
        // takes the id always finds it published.
        let current = {
            let mut state = self.lock();
            if state.epoch == epoch {
                state.session_id = Some(session_id.clone());
                self.publish(&state);
                self.bridge.publish(ActiveSession {
                    user_id: self.user_id.clone(),
                    session_id: session_id.clone(),
                });
            }
            state.epoch == epoch
        };
        if !current {
            // Teardown ran before the id was visible to it.
            self.stamp_ended(&session_id, 0).await;
            return self.superseded(epoch);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_events(Arc::downgrade(self), epoch, events_rx));

        let connection = match self.deps.transport.connect(&credential, events_tx).await {
            Ok(connection) => connection,
            Err(err) => {
                let (kind, message) = classify(RawError::Error(&err), Some(ErrorKind::Network));
                let result = self.fail(epoch, SessionError::new(kind, message));
                if !self.is_current(epoch) {
                    self.bridge.clear_session_if(&session_id);
                }
                return result;
            }
        };

        {
            let mut state = self.lock();
            if state.epoch == epoch {
                state.connection = Some(connection);
                debug!(user_id = %self.user_id, %session_id, "realtime connection open");
                return Ok(());
            }
        }

        if let Err(err) = connection.close().await {
            warn!(user_id = %self.user_id, error = %err, "failed to close superseded connection");
        }
        self.bridge.clear_session_if(&session_id);
        self.superseded(epoch)
    }

    fn superseded(&self, epoch: u64) -> Result<(), SessionError> {
        debug!(user_id = %self.user_id, epoch, "session startup superseded by teardown");
        Ok(())
    }

    /// Moves a startup that is still current into `error`.
    fn fail(&self, epoch: u64, error: SessionError) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.epoch != epoch || state.status != SessionStatus::Connecting {
            return self.superseded(epoch);
        }
        warn!(user_id = %self.user_id, kind = %error.kind, message = %error.message, "voice session failed to start");
        state.status = SessionStatus::Error;
        state.error = Some(error.clone());
        self.publish(&state);
        Err(error)
    }

    async fn disconnect(self: &Arc<Self>) {
        let (epoch, connection, session_id, tool_calls) = {
            let mut state = self.lock();
            if state.is_quiescent() {
                debug!(user_id = %self.user_id, "disconnect while idle");
                return;
            }
            state.closing = true;
            state.epoch += 1;
            let connection = state.connection.take();
            let session_id = state.session_id.take();
            let tool_calls = state.tool_calls;
            state.status = SessionStatus::Idle;
            state.error = None;
            state.tool_calls = 0;
            state.chime_played = false;
            self.publish(&state);
            (state.epoch, connection, session_id, tool_calls)
        };
        info!(user_id = %self.user_id, session_id = ?session_id, "tearing down voice session");

        if let Some(connection) = connection {
            if let Err(err) = connection.close().await {
                warn!(user_id = %self.user_id, error = %err, "failed to close realtime connection");
            }
        }

        if let Some(session_id) = session_id {
            self.stamp_ended(&session_id, tool_calls).await;
            self.bridge.clear_session_if(&session_id);
        }

        let weak = Arc::downgrade(self);
        let grace = self.config.teardown_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                let mut state = inner.lock();
                if state.epoch == epoch {
                    state.closing = false;
                }
            }
        });
    }

    async fn stamp_ended(&self, session_id: &str, tool_calls: u32) {
        let patch = SessionPatch::ended(Some(tool_calls));
        if let Err(err) = self
            .deps
            .sessions
            .update_session(&self.user_id, session_id, patch)
            .await
        {
            warn!(user_id = %self.user_id, session_id, error = %err, "failed to record session end");
        }
    }

    async fn handle_event(&self, epoch: u64, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Ready => self.on_ready(epoch),
            ConnectionEvent::Error(payload) => self.on_error(epoch, &payload),
            ConnectionEvent::History(items) => self.on_history(epoch, &items).await,
        }
    }

    fn on_ready(&self, epoch: u64) {
        let play_chime = {
            let mut state = self.lock();
            if state.epoch != epoch || state.status != SessionStatus::Connecting {
                debug!(user_id = %self.user_id, status = ?state.status, "ignoring stale ready");
                return;
            }
            state.status = SessionStatus::Connected;
            let first = !state.chime_played;
            state.chime_played = true;
            self.publish(&state);
            first
        };
        info!(user_id = %self.user_id, "voice session connected");
        if play_chime {
            self.deps.hooks.ready_chime();
        }
    }

    fn on_error(&self, epoch: u64, payload: &serde_json::Value) {
        let mut state = self.lock();
        if state.closing {
            debug!(user_id = %self.user_id, "suppressing error during teardown");
            return;
        }
        if state.epoch != epoch
            || !matches!(
                state.status,
                SessionStatus::Connecting | SessionStatus::Connected
            )
        {
            debug!(user_id = %self.user_id, status = ?state.status, "ignoring error for inactive session");
            return;
        }

        let (kind, message) = classify(RawError::Json(payload), None);
        warn!(user_id = %self.user_id, %kind, %message, "voice session error");
        state.status = SessionStatus::Error;
        state.error = Some(SessionError::new(kind, message));
        self.publish(&state);
    }

    async fn on_history(&self, epoch: u64, items: &[HistoryItem]) {
        let count = count_tool_calls(items);
        let session_id = {
            let mut state = self.lock();
            if state.epoch != epoch || count <= state.tool_calls {
                return;
            }
            state.tool_calls = count;
            self.publish(&state);
            state.session_id.clone()
        };
        debug!(user_id = %self.user_id, count, "tool call count increased");

        if let Some(session_id) = session_id {
            if let Err(err) = self
                .deps
                .sessions
                .update_session(&self.user_id, &session_id, SessionPatch::tool_calls(count))
                .await
            {
                warn!(user_id = %self.user_id, %session_id, error = %err, "failed to persist tool call count");
            }
        }
        self.deps.hooks.calendar_changed();
    }

    fn active_session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }
}

async fn pump_events(
    controller: Weak<ControllerInner>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = controller.upgrade() else {
            break;
        };
        inner.handle_event(epoch, event).await;
    }
    debug!(epoch, "connection event stream ended");
}

async fn listen_for_end(
    controller: Weak<ControllerInner>,
    mut signals: broadcast::Receiver<EndSignal>,
) {
    loop {
        let signal = match signals.recv().await {
            Ok(signal) => signal,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "missed end signals");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(inner) = controller.upgrade() else {
            break;
        };
        if inner.active_session_id().as_deref() == Some(signal.session_id.as_str()) {
            info!(user_id = %inner.user_id, session_id = %signal.session_id, "session ended by agent");
            inner.disconnect().await;
        } else {
            debug!(session_id = %signal.session_id, "ignoring end signal for inactive session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::Notify;
    use voxcal_store::{BoxFuture, MemoryStore};

    use crate::config::BridgeConfig;
    use crate::error::VoiceError;
    use crate::transport::EphemeralCredential;

    #[derive(Default)]
    struct FakeCapture {
        deny: AtomicBool,
    }

    impl CaptureDevice for FakeCapture {
        fn acquire(&self) -> BoxFuture<'_, Result<(), VoiceError>> {
            Box::pin(async {
                if self.deny.load(Ordering::SeqCst) {
                    Err(VoiceError::device("NotAllowedError: Permission denied"))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[derive(Default)]
    struct FakeIssuer {
        reject: AtomicBool,
        calls: AtomicUsize,
    }

    impl EphemeralIssuer for FakeIssuer {
        fn issue(&self) -> BoxFuture<'_, Result<EphemeralCredential, VoiceError>> {
            Box::pin(async {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.reject.load(Ordering::SeqCst) {
                    return Err(VoiceError::Issuer {
                        status: 500,
                        message: "server_error".to_string(),
                    });
                }
                Ok(EphemeralCredential {
                    value: "ek_test".to_string(),
                    expires_at: None,
                })
            })
        }
    }

    #[derive(Default)]
    struct FakeConnection {
        closed: AtomicBool,
    }

    impl RealtimeConnection for FakeConnection {
        fn close(&self) -> BoxFuture<'_, Result<(), VoiceError>> {
            Box::pin(async {
                self.closed.store(true, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    /// Hands out connections and keeps their event senders for the test.
    #[derive(Default)]
    struct FakeTransport {
        senders: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
        connections: Mutex<Vec<Arc<FakeConnection>>>,
        entered: Notify,
        gate: Option<Notify>,
        fail: AtomicBool,
    }

    impl FakeTransport {
        fn gated() -> Self {
            Self {
                gate: Some(Notify::new()),
                ..Self::default()
            }
        }

        fn events(&self) -> mpsc::UnboundedSender<ConnectionEvent> {
            self.senders.lock().unwrap().last().cloned().unwrap()
        }

        fn connection(&self, index: usize) -> Arc<FakeConnection> {
            self.connections.lock().unwrap()[index].clone()
        }

        fn connection_count(&self) -> usize {
            self.connections.lock().unwrap().len()
        }
    }

    impl RealtimeTransport for FakeTransport {
        fn connect<'a>(
            &'a self,
            _credential: &'a EphemeralCredential,
            events: mpsc::UnboundedSender<ConnectionEvent>,
        ) -> BoxFuture<'a, Result<Arc<dyn RealtimeConnection>, VoiceError>> {
            Box::pin(async move {
                self.senders.lock().unwrap().push(events);
                self.entered.notify_one();
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if self.fail.load(Ordering::SeqCst) {
                    return Err(VoiceError::transport("WebSocket handshake timed out"));
                }
                let connection = Arc::new(FakeConnection::default());
                self.connections.lock().unwrap().push(connection.clone());
                Ok(connection as Arc<dyn RealtimeConnection>)
            })
        }
    }

    #[derive(Default)]
    struct CountingHooks {
        chimes: AtomicUsize,
        calendar_changes: AtomicUsize,
    }

    impl SessionHooks for CountingHooks {
        fn ready_chime(&self) {
            self.chimes.fetch_add(1, Ordering::SeqCst);
        }

        fn calendar_changed(&self) {
            self.calendar_changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        controller: VoiceSessionController,
        bridge: SessionEventBridge,
        store: Arc<MemoryStore>,
        capture: Arc<FakeCapture>,
        issuer: Arc<FakeIssuer>,
        transport: Arc<FakeTransport>,
        hooks: Arc<CountingHooks>,
    }

    fn harness_with(transport: FakeTransport) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let capture = Arc::new(FakeCapture::default());
        let issuer = Arc::new(FakeIssuer::default());
        let transport = Arc::new(transport);
        let hooks = Arc::new(CountingHooks::default());
        let bridge = SessionEventBridge::new(
            store.clone(),
            BridgeConfig::new(Duration::from_millis(20)),
        );
        let deps = VoiceDeps {
            capture: capture.clone(),
            issuer: issuer.clone(),
            transport: transport.clone(),
            sessions: store.clone(),
            hooks: hooks.clone(),
        };
        let controller = VoiceSessionController::new(
            "u1",
            deps,
            bridge.clone(),
            VoiceConfig::default().with_teardown_grace(Duration::from_millis(50)),
        );
        Harness {
            controller,
            bridge,
            store,
            capture,
            issuer,
            transport,
            hooks,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeTransport::default())
    }

    async fn wait_for(
        controller: &VoiceSessionController,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut rx = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("snapshot channel closed")
            .clone()
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn connected(h: &Harness) -> String {
        h.controller.connect().await.unwrap();
        h.transport.events().send(ConnectionEvent::Ready).unwrap();
        let snapshot = wait_for(&h.controller, |s| s.status == SessionStatus::Connected).await;
        snapshot.session_id.unwrap()
    }

    #[tokio::test]
    async fn connect_then_ready_connects_and_chimes_once() {
        let h = harness();
        h.controller.connect().await.unwrap();

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Connecting);
        let session_id = snapshot.session_id.unwrap();
        assert_eq!(h.bridge.active_session().unwrap().session_id, session_id);
        let record = h.store.session("u1", &session_id).unwrap();
        assert_eq!(record.tool_calls_count, 0);
        assert!(record.ended_at.is_none());

        let events = h.transport.events();
        events.send(ConnectionEvent::Ready).unwrap();
        events.send(ConnectionEvent::Ready).unwrap();
        // Ordered after both readies on the same channel.
        events
            .send(ConnectionEvent::History(vec![HistoryItem::tool_call("list_events")]))
            .unwrap();
        let snapshot = wait_for(&h.controller, |s| s.tool_calls == 1).await;

        assert_eq!(snapshot.status, SessionStatus::Connected);
        assert_eq!(h.hooks.chimes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_while_active_is_noop() {
        let h = harness();
        let session_id = connected(&h).await;

        h.controller.connect().await.unwrap();
        assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.snapshot().session_id.as_deref(), Some(session_id.as_str()));
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_noop() {
        let h = harness();
        h.controller.disconnect().await;
        h.controller.disconnect().await;

        assert_eq!(h.controller.snapshot(), SessionSnapshot::idle());
        assert_eq!(h.transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_closes_connection_and_stamps_record() {
        let h = harness();
        let session_id = connected(&h).await;

        h.controller.disconnect().await;

        assert_eq!(h.controller.snapshot(), SessionSnapshot::idle());
        assert!(h.transport.connection(0).closed.load(Ordering::SeqCst));
        assert!(h.store.session("u1", &session_id).unwrap().ended_at.is_some());
        assert!(h.bridge.active_session().is_none());

        h.controller.disconnect().await;
        assert_eq!(h.controller.snapshot(), SessionSnapshot::idle());
    }

    #[tokio::test]
    async fn disconnect_during_connect_ends_idle_without_connection() {
        let h = harness_with(FakeTransport::gated());

        let connecting = {
            let inner = Arc::clone(&h.controller.inner);
            tokio::spawn(async move { inner.connect().await })
        };
        h.transport.entered.notified().await;
        let session_id = h.controller.snapshot().session_id.unwrap();
        assert_eq!(
            h.bridge.active_session().map(|s| s.session_id),
            Some(session_id.clone())
        );

        h.controller.disconnect().await;
        h.transport.gate.as_ref().unwrap().notify_one();
        connecting.await.unwrap().unwrap();

        assert_eq!(h.controller.snapshot(), SessionSnapshot::idle());
        assert!(h.bridge.active_session().is_none());
        assert_eq!(h.transport.connection_count(), 1);
        assert!(h.transport.connection(0).closed.load(Ordering::SeqCst));
        assert!(h.store.session("u1", &session_id).unwrap().ended_at.is_some());

        // A ready from the abandoned connection must not revive the session.
        let _ = h.transport.events().send(ConnectionEvent::Ready);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.controller.snapshot().status, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn failed_connect_after_teardown_leaves_bridge_empty() {
        let h = harness_with(FakeTransport::gated());
        h.transport.fail.store(true, Ordering::SeqCst);

        let connecting = {
            let inner = Arc::clone(&h.controller.inner);
            tokio::spawn(async move { inner.connect().await })
        };
        h.transport.entered.notified().await;
        let session_id = h.controller.snapshot().session_id.unwrap();

        h.controller.disconnect().await;
        h.transport.gate.as_ref().unwrap().notify_one();
        // A teardown that wins the race makes the failure moot.
        connecting.await.unwrap().unwrap();

        assert_eq!(h.controller.snapshot(), SessionSnapshot::idle());
        assert!(h.bridge.active_session().is_none());
        assert!(h.store.session("u1", &session_id).unwrap().ended_at.is_some());
        assert_eq!(
            h.bridge.request_end("u1").await,
            Err(crate::error::BridgeError::NoActiveSession)
        );
    }

    #[tokio::test]
    async fn runtime_error_surfaces_classified() {
        let h = harness();
        connected(&h).await;

        h.transport
            .events()
            .send(ConnectionEvent::Error(json!({
                "type": "error",
                "error": { "message": "WebSocket connection lost" }
            })))
            .unwrap();
        let snapshot = wait_for(&h.controller, |s| s.status == SessionStatus::Error).await;

        let error = snapshot.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Network);
        assert_eq!(error.message, "WebSocket connection lost");
    }

    #[tokio::test]
    async fn error_after_teardown_is_suppressed() {
        let h = harness();
        connected(&h).await;
        let events = h.transport.events();

        h.controller.disconnect().await;
        let _ = events.send(ConnectionEvent::Error(json!({ "message": "Connection closed" })));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn microphone_denial_fails_before_credential_request() {
        let h = harness();
        h.capture.deny.store(true, Ordering::SeqCst);

        let err = h.controller.connect().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Microphone);
        assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.controller.snapshot().status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn issuer_failure_is_credential_error() {
        let h = harness();
        h.issuer.reject.store(true, Ordering::SeqCst);

        let err = h.controller.connect().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Credential);
        assert_eq!(h.transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let h = harness();
        h.transport.fail.store(true, Ordering::SeqCst);

        let err = h.controller.connect().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);

        // The failed session keeps its record until torn down.
        let session_id = snapshot.session_id.unwrap();
        h.controller.disconnect().await;
        assert!(h.store.session("u1", &session_id).unwrap().ended_at.is_some());
    }

    #[tokio::test]
    async fn reconnect_from_error_tears_down_first() {
        let h = harness();
        h.capture.deny.store(true, Ordering::SeqCst);
        h.controller.connect().await.unwrap_err();

        h.capture.deny.store(false, Ordering::SeqCst);
        h.controller.connect().await.unwrap();

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Connecting);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn tool_call_count_is_monotonic() {
        let h = harness();
        let session_id = connected(&h).await;
        let events = h.transport.events();

        let calls = |n: usize| {
            ConnectionEvent::History(
                (0..n)
                    .map(|i| HistoryItem::tool_call(format!("tool-{i}")))
                    .chain(std::iter::once(HistoryItem::new("message")))
                    .collect(),
            )
        };

        events.send(calls(2)).unwrap();
        wait_for(&h.controller, |s| s.tool_calls == 2).await;
        events.send(calls(1)).unwrap();
        events.send(calls(3)).unwrap();
        wait_for(&h.controller, |s| s.tool_calls == 3).await;

        eventually(|| h.store.session("u1", &session_id).unwrap().tool_calls_count == 3).await;
        eventually(|| h.hooks.calendar_changes.load(Ordering::SeqCst) == 2).await;

        h.controller.disconnect().await;
        assert_eq!(
            h.store.session("u1", &session_id).unwrap().tool_calls_count,
            3
        );
    }

    #[tokio::test]
    async fn bridge_end_signal_tears_down() {
        let h = harness();
        let session_id = connected(&h).await;

        h.bridge.request_end("u1").await.unwrap();
        wait_for(&h.controller, |s| s.status == SessionStatus::Idle).await;

        let record = h.store.session("u1", &session_id).unwrap();
        assert!(record.ended_at.is_some());
        eventually(|| h.transport.connection(0).closed.load(Ordering::SeqCst)).await;
        assert!(h.bridge.active_session().is_none());
    }

    #[tokio::test]
    async fn drop_tears_down_in_background() {
        let h = harness();
        let session_id = connected(&h).await;
        let Harness {
            controller,
            store,
            transport,
            ..
        } = h;

        drop(controller);
        eventually(|| store.session("u1", &session_id).unwrap().ended_at.is_some()).await;
        assert!(transport.connection(0).closed.load(Ordering::SeqCst));
    }
}
