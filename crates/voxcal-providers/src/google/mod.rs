//! Google OAuth 2.0 and Calendar API v3.
//!
//! - [`OAuthClient`] performs the PKCE code exchange and refresh-token grant
//!   against the configured token endpoint.
//! - [`GoogleCalendarClient`] lists, creates, updates and deletes events with
//!   a bearer access token.
//!
//! Both are configured from a single [`GoogleConfig`], whose endpoint URLs can
//! be redirected for testing.

mod client;
mod config;
mod oauth;

pub use client::{CalendarEvent, EventDraft, EventPatch, EventTime, GoogleCalendarClient, ListQuery};
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::{OAuthClient, PkceFlow, TokenGrant};
