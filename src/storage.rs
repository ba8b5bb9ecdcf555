//! Durable key-value seam used by every store.
//!
//! Each store owns exactly one key and reads/writes its whole state as a
//! single JSON blob. [`crate::local_db_state::AppDbState`] backs this with
//! LMDB; [`MemoryStore`] keeps blobs in memory for tests and ephemeral hosts.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app_response::AppResponse;

/// Whole-blob string storage keyed by name.
pub trait KeyValueStore: Send + Sync {
    /// Returns the blob stored under `key`, or `None` when absent.
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse>;

    /// Replaces the blob stored under `key`.
    fn write(&self, key: &str, value: &str) -> Result<(), AppResponse>;

    /// Deletes `key`. Returns `false` when nothing was stored.
    fn remove(&self, key: &str) -> Result<bool, AppResponse>;

    /// Forces buffered writes to durable media.
    fn flush(&self) -> Result<(), AppResponse> {
        Ok(())
    }
}

/// Reads and decodes the JSON blob under `key`.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, AppResponse> {
    match store.read(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and stores it under `key`.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), AppResponse> {
    let raw = serde_json::to_string(value)?;
    store.write(key, &raw)
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AppResponse> {
        self.blobs
            .lock()
            .map_err(|_| AppResponse::DatabaseError("Memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AppResponse> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, AppResponse> {
        Ok(self.lock()?.remove(key).is_some())
    }
}
