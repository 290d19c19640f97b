//! Google Calendar API v3 client for event CRUD.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Upper bound on pages followed by [`GoogleCalendarClient::list_events`].
const MAX_PAGES: usize = 10;

/// Start or end of an event. All-day events carry `date`, timed events
/// carry `date_time` (RFC 3339).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(date_time: impl Into<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            ..Self::default()
        }
    }

    pub fn all_day(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }
}

/// A calendar event as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub html_link: Option<String>,
}

/// Body of an event insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
}

/// Partial update; only present fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
    }
}

/// Filters for listing events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// RFC 3339 lower bound on event end time.
    #[serde(default)]
    pub time_min: Option<String>,
    /// RFC 3339 upper bound on event start time.
    #[serde(default)]
    pub time_max: Option<String>,
    /// Free-text search.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Calendar API client bound to one access token.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(
        http_client: reqwest::Client,
        api_base: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
            access_token: access_token.into(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// Lists events ordered by start time, expanding recurring events.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        query: &ListQuery,
    ) -> ProviderResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self
                .http_client
                .get(self.events_url(calendar_id))
                .bearer_auth(&self.access_token)
                .query(&[("singleEvents", "true"), ("orderBy", "startTime")]);

            if let Some(time_min) = &query.time_min {
                request = request.query(&[("timeMin", time_min)]);
            }
            if let Some(time_max) = &query.time_max {
                request = request.query(&[("timeMax", time_max)]);
            }
            if let Some(q) = &query.query {
                request = request.query(&[("q", q)]);
            }
            if let Some(max) = query.max_results {
                request = request.query(&[("maxResults", max.to_string())]);
            }
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = send(request, "list events").await?;
            let page: EventListResponse = parse_json(response).await?;

            events.extend(
                page.items
                    .into_iter()
                    .filter(|e| e.status.as_deref() != Some("cancelled")),
            );

            if let Some(max) = query.max_results {
                if events.len() >= max {
                    events.truncate(max);
                    break;
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = events.len(), calendar_id, "listed events");
        Ok(events)
    }

    pub async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> ProviderResult<CalendarEvent> {
        let request = self
            .http_client
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(draft);

        let event: CalendarEvent = parse_json(send(request, "create event").await?).await?;
        debug!(event_id = %event.id, calendar_id, "created event");
        Ok(event)
    }

    pub async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> ProviderResult<CalendarEvent> {
        let request = self
            .http_client
            .patch(self.event_url(calendar_id, event_id))
            .bearer_auth(&self.access_token)
            .json(patch);

        let event: CalendarEvent = parse_json(send(request, "update event").await?).await?;
        debug!(event_id, calendar_id, "updated event");
        Ok(event)
    }

    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> ProviderResult<()> {
        let request = self
            .http_client
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(&self.access_token);

        send(request, "delete event").await?;
        debug!(event_id, calendar_id, "deleted event");
        Ok(())
    }
}

/// Sends a request and maps non-success statuses to provider errors.
async fn send(request: reqwest::RequestBuilder, context: &str) -> ProviderResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(context, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => {
            ProviderError::authentication(format!("{context}: access token expired or invalid"))
        }
        reqwest::StatusCode::FORBIDDEN => {
            ProviderError::authorization(format!("{context}: access denied to calendar"))
        }
        reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::GONE => {
            ProviderError::not_found(format!("{context}: resource not found"))
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(format!(
            "{context}: rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {s} seconds"))
                .unwrap_or_default()
        )),
        reqwest::StatusCode::BAD_REQUEST => {
            ProviderError::bad_request(format!("{context}: {}", body.trim()))
        }
        s if s.is_server_error() => {
            ProviderError::server(format!("{context}: API error ({s}): {}", body.trim()))
        }
        s => ProviderError::invalid_response(format!(
            "{context}: unexpected status ({s}): {}",
            body.trim()
        )),
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> ProviderResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest("failed to read response", e))?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse response: {e}")).with_source(e)
    })
}
