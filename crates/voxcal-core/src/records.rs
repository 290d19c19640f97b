//! Persistent record types.
//!
//! These are the rows the credential and session cores read and write
//! through the store contracts in `voxcal-store`:
//!
//! - [`TokenRecord`] - one OAuth token pair per user
//! - [`ActionLogEntry`] - append-only audit of calendar operations
//! - [`VoiceSessionRecord`] - bookkeeping for one realtime voice session

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before expiry at which an access token is considered stale.
pub const DEFAULT_STALE_MARGIN_SECS: i64 = 5 * 60;

/// A stored OAuth token pair for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The user this token pair belongs to (unique key).
    pub user_id: String,

    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token used to obtain new access tokens.
    pub refresh_token: String,

    /// When the access token expires.
    pub expires_at: DateTime<Utc>,

    /// When the record was first created.
    pub created_at: DateTime<Utc>,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Creates a new record from a fresh OAuth exchange.
    pub fn new(
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the access token expires within `margin` of now.
    pub fn is_stale(&self, margin: Duration) -> bool {
        self.is_stale_at(Utc::now(), margin)
    }

    /// Returns true if the access token expires within `margin` of `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now < margin
    }

    /// Returns the time until the access token expires (negative if expired).
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Applies the result of a refresh grant in place.
    ///
    /// The refresh token is only replaced when the provider rotated it.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) {
        self.access_token = access_token.into();
        if let Some(rotated) = refresh_token {
            self.refresh_token = rotated;
        }
        self.expires_at = expires_at;
        self.updated_at = Utc::now();
    }
}

/// The kind of calendar operation recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    List,
}

impl ActionKind {
    /// Returns the lowercase name stored in the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only entry in the calendar action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub user_id: String,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ActionLogEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(user_id: impl Into<String>, action: ActionKind) -> Self {
        Self {
            user_id: user_id.into(),
            action,
            event_id: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder method to set the affected event.
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Builder method to attach free-form details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Bookkeeping for one realtime voice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSessionRecord {
    pub user_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tool_calls_count: u32,
}

impl VoiceSessionRecord {
    /// Creates a record for a session starting now.
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            tool_calls_count: 0,
        }
    }

    /// Returns true if the session has not been ended yet.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A field-level update to a [`VoiceSessionRecord`].
///
/// `ended_at` is write-once and `tool_calls_count` never decreases; both
/// rules are enforced by [`SessionPatch::apply`] so every store backend
/// behaves the same.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub ended_at: Option<DateTime<Utc>>,
    pub tool_calls_count: Option<u32>,
}

impl SessionPatch {
    /// A patch that only raises the tool-call count.
    pub fn tool_calls(count: u32) -> Self {
        Self {
            ended_at: None,
            tool_calls_count: Some(count),
        }
    }

    /// A patch that ends the session now, recording the final count if known.
    pub fn ended(tool_calls_count: Option<u32>) -> Self {
        Self {
            ended_at: Some(Utc::now()),
            tool_calls_count,
        }
    }

    /// Applies the patch to `record`.
    pub fn apply(&self, record: &mut VoiceSessionRecord) {
        if record.ended_at.is_none() {
            record.ended_at = self.ended_at;
        }
        if let Some(count) = self.tool_calls_count {
            record.tool_calls_count = record.tool_calls_count.max(count);
        }
    }
}
