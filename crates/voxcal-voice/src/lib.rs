//! Voice session lifecycle for the calendar assistant.
//!
//! - [`VoiceSessionController`] drives one user's realtime speech session
//!   through `idle → connecting → connected`, classifying failures into
//!   [`ErrorKind`](voxcal_core::ErrorKind)s and tearing down cleanly even
//!   while a startup is still in flight
//! - [`SessionEventBridge`] lets agent tools look up the active session and
//!   ask the controller to end it
//! - [`CalendarTools`] dispatches agent tool calls to the calendar service
//! - [`transport`] defines the capture, issuer and realtime connection seams;
//!   [`HttpEphemeralIssuer`] implements credential issuance over HTTP

pub mod bridge;
pub mod config;
pub mod controller;
pub mod ephemeral;
pub mod error;
pub mod tools;
pub mod transport;

pub use bridge::{ActiveSession, EndSignal, SessionEventBridge};
pub use config::{BridgeConfig, VoiceConfig};
pub use controller::{SessionSnapshot, SessionStatus, VoiceDeps, VoiceSessionController};
pub use ephemeral::HttpEphemeralIssuer;
pub use error::{BridgeError, SessionError, VoiceError};
pub use tools::{CalendarTools, ToolDefinition, ToolError};
pub use transport::{
    CaptureDevice, ConnectionEvent, EphemeralCredential, EphemeralIssuer, HistoryItem, NoopHooks,
    RealtimeConnection, RealtimeTransport, SessionHooks,
};
