//! Classification of voice session failures.
//!
//! Failures reach the session layer in many shapes: plain strings from a
//! device check, `std::error::Error` values from HTTP clients, and opaque
//! JSON payloads from the realtime transport (often wrapped as
//! `{"error": {"message": ...}}`). This module reduces all of them to a
//! single display string with [`normalize_error`] and then maps that string
//! to a closed [`ErrorKind`] taxonomy with [`classify`].
//!
//! Everything here is pure and synchronous.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display string used when there is no error value at all.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// How deep to follow nested `error` wrappers looking for a message.
const MAX_WRAPPER_DEPTH: usize = 4;

/// Timeouts are network failures whatever they were waiting for.
static TIMEOUT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(timeout|timed out|etimedout|deadline exceeded)\b")
        .expect("Invalid timeout regex")
});

static CREDENTIAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(api[ _-]?key|unauthori[sz]ed|unauthenticated|forbidden|credentials?|(invalid|expired|revoked|missing|bad)( access| refresh| bearer)? token|token (has )?(expired|been revoked|is invalid)|authenticat\w*|authori[sz]ation|client[ _]secret|ephemeral key|invalid[ _]grant|401|403)\b",
    )
    .expect("Invalid credential regex")
});

static MICROPHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(microphone|mic|audio|getusermedia|notallowederror|notfounderror|notreadableerror|permission|devices?|capture|recording)\b",
    )
    .expect("Invalid microphone regex")
});

static NETWORK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(network|timeout|timed out|connection|connect\w*|disconnect\w*|websocket|webrtc|fetch|offline|unreachable|dns|econn\w*|transport|socket|502|503|504)\b",
    )
    .expect("Invalid network regex")
});

/// The closed taxonomy of session-side failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Capture device missing, busy, or permission denied.
    Microphone,
    /// Server or ephemeral credential rejected.
    Credential,
    /// Connectivity, transport, or timeout failure.
    Network,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Returns the tag used in logs and serialized state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Microphone => "microphone",
            Self::Credential => "credential",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }

    /// Returns a short user-facing title for this kind of failure.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Microphone => "Microphone unavailable",
            Self::Credential => "Voice service credentials rejected",
            Self::Network => "Connection problem",
            Self::Unknown => "Voice session failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A borrowed view of a failure in any of the shapes the session layer sees.
#[derive(Debug, Clone, Copy)]
pub enum RawError<'a> {
    /// No error value was provided.
    Absent,
    /// A plain message.
    Text(&'a str),
    /// A Rust error value; its source chain is included.
    Error(&'a (dyn std::error::Error + 'a)),
    /// An opaque payload, e.g. an error event from the realtime transport.
    Json(&'a Value),
}

impl<'a> From<&'a str> for RawError<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for RawError<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a Value> for RawError<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Json(value)
    }
}

impl<'a, T> From<Option<T>> for RawError<'a>
where
    T: Into<RawError<'a>>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

/// Reduces a failure of any shape to a single display string.
///
/// Objects without a usable `message` (directly or under nested `error`
/// wrappers) are serialized as JSON. [`UNKNOWN_ERROR`] is only returned when
/// there is no value at all.
pub fn normalize_error(raw: RawError<'_>) -> String {
    match raw {
        RawError::Absent => UNKNOWN_ERROR.to_string(),
        RawError::Text(text) => text.to_string(),
        RawError::Error(err) => {
            let mut message = err.to_string();
            let mut source = err.source();
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            message
        }
        RawError::Json(Value::Null) => UNKNOWN_ERROR.to_string(),
        RawError::Json(value) => message_field(value, 0).unwrap_or_else(|| match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| UNKNOWN_ERROR.to_string()),
        }),
    }
}

/// Looks for a string message in `value`, following `error` wrappers.
fn message_field(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_WRAPPER_DEPTH {
        return None;
    }
    match value {
        Value::String(s) if depth > 0 => Some(s.clone()),
        Value::Object(map) => {
            if let Some(Value::String(message)) = map.get("message") {
                return Some(message.clone());
            }
            map.get("error")
                .and_then(|inner| message_field(inner, depth + 1))
        }
        _ => None,
    }
}

/// Maps a message to an [`ErrorKind`] by keyword family.
///
/// Timeout phrases are checked first, then the families in order:
/// credential, microphone, network.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    if TIMEOUT_REGEX.is_match(&message) {
        ErrorKind::Network
    } else if CREDENTIAL_REGEX.is_match(&message) {
        ErrorKind::Credential
    } else if MICROPHONE_REGEX.is_match(&message) {
        ErrorKind::Microphone
    } else if NETWORK_REGEX.is_match(&message) {
        ErrorKind::Network
    } else {
        ErrorKind::Unknown
    }
}

/// Normalizes and classifies a failure.
///
/// `hint` names the step that failed; it is used when no keyword family
/// matches the message.
pub fn classify(raw: RawError<'_>, hint: Option<ErrorKind>) -> (ErrorKind, String) {
    let message = normalize_error(raw);
    let kind = match classify_message(&message) {
        ErrorKind::Unknown => hint.unwrap_or(ErrorKind::Unknown),
        kind => kind,
    };
    (kind, message)
}
