//! Seams between the session controller and the outside world.
//!
//! Audio capture, credential issuance and the realtime connection are
//! platform concerns; the controller only sees these traits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use voxcal_store::BoxFuture;

use crate::error::VoiceError;

/// Item type the realtime service uses for tool invocations.
pub const TOOL_CALL_ITEM_TYPE: &str = "function_call";

/// Audio input device.
pub trait CaptureDevice: Send + Sync {
    /// Checks that a device is present and capture is permitted.
    fn acquire(&self) -> BoxFuture<'_, Result<(), VoiceError>>;
}

/// Issues short-lived client credentials for one realtime session.
pub trait EphemeralIssuer: Send + Sync {
    fn issue(&self) -> BoxFuture<'_, Result<EphemeralCredential, VoiceError>>;
}

/// A short-lived credential scoped to one session.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralCredential {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralCredential")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An entry of the agent conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl HistoryItem {
    pub fn new(item_type: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            name: None,
        }
    }

    pub fn tool_call(name: impl Into<String>) -> Self {
        Self {
            item_type: TOOL_CALL_ITEM_TYPE.to_string(),
            name: Some(name.into()),
        }
    }

    pub fn is_tool_call(&self) -> bool {
        self.item_type == TOOL_CALL_ITEM_TYPE
    }
}

/// Counts tool invocations in a history snapshot.
pub fn count_tool_calls(history: &[HistoryItem]) -> u32 {
    let count = history.iter().filter(|item| item.is_tool_call()).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Events emitted by an open realtime connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The transport is live and audio flows.
    Ready,
    /// A runtime failure, in whatever shape the service reported it.
    Error(Value),
    /// The full conversation history after an update.
    History(Vec<HistoryItem>),
}

/// Opens realtime connections.
pub trait RealtimeTransport: Send + Sync {
    /// Opens a connection authenticated with `credential`.
    ///
    /// Events are delivered on `events` from the moment this is called, so
    /// a `Ready` may arrive before the returned future resolves. Dropping
    /// the sender ends the event stream.
    fn connect<'a>(
        &'a self,
        credential: &'a EphemeralCredential,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> BoxFuture<'a, Result<Arc<dyn RealtimeConnection>, VoiceError>>;
}

/// An open realtime connection.
pub trait RealtimeConnection: Send + Sync {
    /// Closes the connection gracefully. Connections without a close
    /// capability keep the default.
    fn close(&self) -> BoxFuture<'_, Result<(), VoiceError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Side effects the controller triggers on the host.
pub trait SessionHooks: Send + Sync {
    /// Plays the connection chime.
    fn ready_chime(&self) {}

    /// The agent changed the calendar; views should refresh.
    fn calendar_changed(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}
