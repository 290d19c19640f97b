//! Core types: records, error classification, tracing

pub mod classify;
pub mod records;
pub mod tracing;

pub use classify::{ErrorKind, RawError, UNKNOWN_ERROR, classify, classify_message, normalize_error};
pub use records::{
    ActionKind, ActionLogEntry, SessionPatch, TokenRecord, VoiceSessionRecord, DEFAULT_STALE_MARGIN_SECS,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
