//! LMDB-backed blob storage.
//!
//! One environment directory (`<name>.lmdb`) holds a single unnamed database
//! whose keys are the store keys (`farm_data`, `market_cache`,
//! `pending_uploads`) and whose values are UTF-8 JSON documents.

use std::fs;
use std::path::{Path, PathBuf};

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};

use crate::app_response::AppResponse;
use crate::storage::KeyValueStore;

/// Default LMDB map size (16 MiB).
pub const DEFAULT_MAP_SIZE: usize = 16 * 1024 * 1024;

pub struct AppDbState {
    env: Environment,
    db: Database,
    path: PathBuf,
}

impl AppDbState {
    /// Opens (or creates) the environment at `<name>.lmdb` with the default map size.
    pub fn init(name: String) -> Result<Self, AppResponse> {
        Self::init_with_map_size(name, DEFAULT_MAP_SIZE)
    }

    pub fn init_with_map_size(name: String, map_size: usize) -> Result<Self, AppResponse> {
        if name.trim().is_empty() {
            return Err(AppResponse::BadRequest("Database name cannot be empty".to_string()));
        }

        let path = PathBuf::from(format!("{name}.lmdb"));
        if path.exists() {
            info!("Opening existing database at: {}", path.display());
        } else {
            info!("Creating new database at: {}", path.display());
            fs::create_dir_all(&path)?;
        }

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(map_size)
            .open(&path)
            .map_err(|e| {
                warn!("Failed to open LMDB environment at {}: {e}", path.display());
                AppResponse::from(e)
            })?;
        let db = env.create_db(None, DatabaseFlags::empty())?;

        Ok(Self { env, db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_blob(&self, key: &str) -> Result<Option<String>, AppResponse> {
        let txn = self.env.begin_ro_txn()?;
        let blob = match txn.get(self.db, &key) {
            Ok(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    AppResponse::SerializationError(format!("Invalid UTF-8 under '{key}': {e}"))
                })?;
                Some(text.to_string())
            }
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(blob)
    }

    pub fn put_blob(&self, key: &str, value: &str) -> Result<(), AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &value, WriteFlags::empty())?;
        txn.commit()?;
        debug!("Stored {} bytes under '{key}'", value.len());
        Ok(())
    }

    pub fn delete_blob(&self, key: &str) -> Result<bool, AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        let removed = match txn.del(self.db, &key, None) {
            Ok(()) => true,
            Err(lmdb::Error::NotFound) => false,
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Removes every key while keeping the environment open.
    pub fn clear_all_records(&self) -> Result<(), AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.clear_db(self.db)?;
        txn.commit()?;
        Ok(())
    }

    /// Syncs the environment to disk. The handle stays usable; LMDB releases
    /// the environment when the value is dropped.
    pub fn close_database(&self) -> Result<(), AppResponse> {
        self.env.sync(true)?;
        info!("Database at {} synced for close", self.path.display());
        Ok(())
    }
}

impl KeyValueStore for AppDbState {
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse> {
        self.get_blob(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AppResponse> {
        self.put_blob(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, AppResponse> {
        self.delete_blob(key)
    }

    fn flush(&self) -> Result<(), AppResponse> {
        self.close_database()
    }
}
