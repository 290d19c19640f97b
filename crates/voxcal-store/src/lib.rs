//! Record store contracts and backends.
//!
//! The credential and session cores never talk to a database directly;
//! they go through three narrow contracts:
//!
//! - [`TokenStore`] - keyed lookup, idempotent upsert and delete of [`TokenRecord`]s
//! - [`ActionLog`] - append-only [`ActionLogEntry`] inserts
//! - [`SessionStore`] - insert, lookup and field patches of [`VoiceSessionRecord`]s
//!
//! [`MemoryStore`] implements all three and is what tests and single-process
//! deployments use. [`FileTokenStore`] persists tokens as a JSON file.
//!
//! [`TokenRecord`]: voxcal_core::TokenRecord
//! [`ActionLogEntry`]: voxcal_core::ActionLogEntry
//! [`VoiceSessionRecord`]: voxcal_core::VoiceSessionRecord

mod contracts;
mod error;
mod file;
mod memory;

pub use contracts::{ActionLog, BoxFuture, SessionStore, TokenStore};
pub use error::{StoreError, StoreResult};
pub use file::FileTokenStore;
pub use memory::MemoryStore;
