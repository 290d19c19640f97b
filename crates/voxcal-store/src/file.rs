//! JSON-file token store.
//!
//! All users' token records live in one JSON object keyed by user id. Writes
//! go to a temporary file that is renamed over the original, and the file
//! is restricted to the owner on Unix.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};
use voxcal_core::TokenRecord;

use crate::contracts::{BoxFuture, TokenStore};
use crate::error::{StoreError, StoreResult};

type TokenMap = HashMap<String, TokenRecord>;

/// A [`TokenStore`] persisted to a single JSON file.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    records: Mutex<TokenMap>,
}

impl FileTokenStore {
    /// Opens the store at `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            let records: TokenMap = serde_json::from_str(&content)?;
            info!(count = records.len(), "loaded token records from {:?}", path);
            records
        } else {
            debug!("no token file at {:?}", path);
            TokenMap::new()
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the records, persists it, then commits.
    ///
    /// The in-memory map is left untouched if the write fails.
    fn write_with<T>(&self, change: impl FnOnce(&mut TokenMap) -> T) -> StoreResult<T> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = records.clone();
        let result = change(&mut next);
        self.save(&next)?;
        *records = next;
        Ok(result)
    }

    fn save(&self, records: &TokenMap) -> StoreResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(records)?;
        fs::write(&temp_path, content).map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }

        debug!(count = records.len(), "saved token records to {:?}", self.path);
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Option<TokenRecord>>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(user_id)
                .cloned())
        })
    }

    fn upsert(&self, record: TokenRecord) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write_with(|records| {
                records.insert(record.user_id.clone(), record);
            })
        })
    }

    fn delete<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let existed = self
                .records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(user_id);
            if !existed {
                return Ok(false);
            }
            let removed = self.write_with(|records| records.remove(user_id).is_some())?;
            if removed {
                info!(user_id, "removed token record");
            }
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(user: &str, access: &str) -> TokenRecord {
        TokenRecord::new(user, access, "refresh", Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");

        let store = FileTokenStore::open(&path).unwrap();
        store.upsert(record("u1", "a1")).await.unwrap();
        store.upsert(record("u2", "a2")).await.unwrap();
        assert!(path.exists());

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.get("u1").await.unwrap().unwrap().access_token, "a1");
        assert_eq!(reopened.get("u2").await.unwrap().unwrap().access_token, "a2");
    }

    #[tokio::test]
    async fn delete_persists_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::open(&path).unwrap();
        store.upsert(record("u1", "a1")).await.unwrap();

        assert!(store.delete("u1").await.unwrap());
        assert!(!store.delete("u1").await.unwrap());

        let reopened = FileTokenStore::open(&path).unwrap();
        assert!(reopened.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.get("anyone").await.unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "not json").unwrap();

        let err = FileTokenStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::open(&path).unwrap();
        store.upsert(record("u1", "a1")).await.unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
