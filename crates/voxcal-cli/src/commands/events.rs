//! Upcoming event listing.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use voxcal_providers::google::{CalendarEvent, EventTime, ListQuery};
use voxcal_providers::{CalendarClientFactory, CalendarService};
use voxcal_store::MemoryStore;

use super::Context;
use crate::error::{ClientError, ClientResult};

pub async fn list(ctx: &Context, days: u32, limit: Option<usize>, json: bool) -> ClientResult<()> {
    let factory = CalendarClientFactory::from_config(ctx.credentials.clone(), &ctx.google)?;
    // The CLI keeps no action history of its own.
    let service = CalendarService::new(
        factory,
        Arc::new(MemoryStore::new()),
        ctx.google.calendar_id.clone(),
    );

    let query = window(Utc::now(), days, limit);
    let events = service.list_events(&ctx.user_id, &query).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&events)
            .map_err(|e| ClientError::config(e.to_string()))?;
        println!("{rendered}");
    } else if events.is_empty() {
        println!("No events in the next {days} day(s).");
    } else {
        for event in &events {
            println!("{}", format_event(event));
        }
    }
    Ok(())
}

fn window(now: DateTime<Utc>, days: u32, limit: Option<usize>) -> ListQuery {
    ListQuery {
        time_min: Some(now.to_rfc3339()),
        time_max: Some((now + Duration::days(i64::from(days))).to_rfc3339()),
        query: None,
        max_results: limit,
    }
}

fn format_event(event: &CalendarEvent) -> String {
    let title = event.summary.as_deref().unwrap_or("(no title)");
    let mut line = format!("{}  {title}", format_start(&event.start));
    if let Some(ref location) = event.location {
        line.push_str(&format!(" @ {location}"));
    }
    line
}

fn format_start(start: &EventTime) -> String {
    if let Some(ref dt) = start.date_time
        && let Ok(parsed) = DateTime::parse_from_rfc3339(dt)
    {
        return parsed
            .with_timezone(&Local)
            .format("%a %d %b %H:%M")
            .to_string();
    }
    if let Some(ref date) = start.date
        && let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d")
    {
        return format!("{} (all day)", parsed.format("%a %d %b"));
    }
    "?".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(summary: Option<&str>, start: EventTime) -> CalendarEvent {
        CalendarEvent {
            id: "e1".to_string(),
            summary: summary.map(str::to_string),
            description: None,
            location: None,
            start,
            end: EventTime::default(),
            status: None,
            html_link: None,
        }
    }

    #[test]
    fn window_spans_requested_days() {
        let now = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let query = window(now, 3, Some(5));
        assert_eq!(query.time_min.as_deref(), Some("2026-03-02T09:00:00+00:00"));
        assert_eq!(query.time_max.as_deref(), Some("2026-03-05T09:00:00+00:00"));
        assert_eq!(query.max_results, Some(5));
    }

    #[test]
    fn all_day_event_line() {
        let line = format_event(&event(Some("Offsite"), EventTime::all_day("2026-03-04")));
        assert_eq!(line, "Wed 04 Mar (all day)  Offsite");
    }

    #[test]
    fn untitled_event_with_location() {
        let mut e = event(None, EventTime::default());
        e.location = Some("Room 4".to_string());
        assert_eq!(format_event(&e), "?  (no title) @ Room 4");
    }
}
