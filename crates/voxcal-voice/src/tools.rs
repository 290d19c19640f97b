//! Calendar tools exposed to the speech agent.
//!
//! The agent invokes tools by name with JSON arguments; results go back to
//! it as JSON. Failures are reported in the result rather than raised, so
//! the agent can tell the user what went wrong.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use voxcal_providers::CalendarService;
use voxcal_providers::calendar::CalendarError;
use voxcal_providers::google::{EventDraft, EventPatch, ListQuery};

use crate::bridge::SessionEventBridge;
use crate::error::BridgeError;

pub const LIST_EVENTS: &str = "list_events";
pub const CREATE_EVENT: &str = "create_event";
pub const UPDATE_EVENT: &str = "update_event";
pub const DELETE_EVENT: &str = "delete_event";
pub const END_SESSION: &str = "end_session";

/// A tool declaration in the realtime service's function format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ToolError {
    fn to_result(&self) -> Value {
        let reauth_required = matches!(self, Self::Calendar(err) if err.is_reauth_required());
        json!({
            "ok": false,
            "error": self.to_string(),
            "reauth_required": reauth_required,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    event_id: String,
    #[serde(flatten)]
    patch: EventPatch,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    event_id: String,
}

/// Dispatches agent tool calls for one user.
#[derive(Debug, Clone)]
pub struct CalendarTools {
    user_id: String,
    calendar: CalendarService,
    bridge: SessionEventBridge,
}

impl CalendarTools {
    pub fn new(
        user_id: impl Into<String>,
        calendar: CalendarService,
        bridge: SessionEventBridge,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            calendar,
            bridge,
        }
    }

    /// Declarations to register with the realtime session.
    pub fn definitions() -> Vec<ToolDefinition> {
        let event_time = json!({
            "type": "object",
            "properties": {
                "dateTime": { "type": "string", "description": "RFC 3339 timestamp" },
                "date": { "type": "string", "description": "YYYY-MM-DD for all-day events" },
                "timeZone": { "type": "string" }
            }
        });

        vec![
            ToolDefinition {
                tool_type: "function",
                name: LIST_EVENTS,
                description: "List calendar events in a time range, optionally matching a search text.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "time_min": { "type": "string", "description": "RFC 3339 lower bound" },
                        "time_max": { "type": "string", "description": "RFC 3339 upper bound" },
                        "query": { "type": "string" },
                        "max_results": { "type": "integer" }
                    }
                }),
            },
            ToolDefinition {
                tool_type: "function",
                name: CREATE_EVENT,
                description: "Create a calendar event.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "summary": { "type": "string" },
                        "description": { "type": "string" },
                        "location": { "type": "string" },
                        "start": event_time,
                        "end": event_time
                    },
                    "required": ["summary", "start", "end"]
                }),
            },
            ToolDefinition {
                tool_type: "function",
                name: UPDATE_EVENT,
                description: "Change fields of an existing calendar event.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "event_id": { "type": "string" },
                        "summary": { "type": "string" },
                        "description": { "type": "string" },
                        "location": { "type": "string" },
                        "start": event_time,
                        "end": event_time
                    },
                    "required": ["event_id"]
                }),
            },
            ToolDefinition {
                tool_type: "function",
                name: DELETE_EVENT,
                description: "Delete a calendar event.",
                parameters: json!({
                    "type": "object",
                    "properties": { "event_id": { "type": "string" } },
                    "required": ["event_id"]
                }),
            },
            ToolDefinition {
                tool_type: "function",
                name: END_SESSION,
                description: "End the voice conversation after saying goodbye.",
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    /// Runs a tool and returns its JSON result.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Value {
        debug!(user_id = %self.user_id, tool = name, "invoking tool");
        match self.dispatch(name, arguments).await {
            Ok(result) => result,
            Err(err) => {
                warn!(user_id = %self.user_id, tool = name, error = %err, "tool failed");
                err.to_result()
            }
        }
    }

    async fn dispatch(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let user_id = self.user_id.as_str();
        match name {
            LIST_EVENTS => {
                let query: ListQuery = parse(LIST_EVENTS, arguments)?;
                let events = self.calendar.list_events(user_id, &query).await?;
                Ok(json!({ "ok": true, "events": events }))
            }
            CREATE_EVENT => {
                let draft: EventDraft = parse(CREATE_EVENT, arguments)?;
                let event = self.calendar.create_event(user_id, &draft).await?;
                Ok(json!({ "ok": true, "event": event }))
            }
            UPDATE_EVENT => {
                let args: UpdateArgs = parse(UPDATE_EVENT, arguments)?;
                let event = self
                    .calendar
                    .update_event(user_id, &args.event_id, &args.patch)
                    .await?;
                Ok(json!({ "ok": true, "event": event }))
            }
            DELETE_EVENT => {
                let args: DeleteArgs = parse(DELETE_EVENT, arguments)?;
                self.calendar.delete_event(user_id, &args.event_id).await?;
                Ok(json!({ "ok": true, "deleted": args.event_id }))
            }
            END_SESSION => {
                let ended = self.bridge.request_end(user_id).await?;
                Ok(json!({ "ok": true, "session_id": ended.session_id }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Missing or null arguments are treated as an empty object.
fn parse<T: serde::de::DeserializeOwned>(tool: &'static str, arguments: &Value) -> Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(arguments).map_err(|source| ToolError::InvalidArguments { tool, source })
}
