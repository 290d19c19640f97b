//! voxcal command-line interface
//!
//! Connects a Google Calendar account through the OAuth consent flow and
//! inspects the stored connection and upcoming events.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
