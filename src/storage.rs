//! Key-value persistence
//!
//! The engine defines what it stores (settings, exception apps, reminder log,
//! usage rollups) as JSON values under fixed keys. Where they live is up to the
//! `KeyValueStore` implementation.

use crate::error::CoachError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

pub const SETTINGS_KEY: &str = "settings";
pub const EXCEPTIONS_KEY: &str = "exception_apps";
pub const REMINDERS_KEY: &str = "reminders";
pub const USAGE_KEY: &str = "usage";

/// Every key the engine persists
pub const STATE_KEYS: [&str; 4] = [SETTINGS_KEY, EXCEPTIONS_KEY, REMINDERS_KEY, USAGE_KEY];

/// Trait for string key-value stores
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoachError>;
    fn put(&self, key: &str, value: &str) -> Result<(), CoachError>;
}

/// In-memory store, mostly for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoachError> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), CoachError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CoachError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            CoachError::StorageError(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CoachError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CoachError::StorageError(format!("invalid key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoachError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| CoachError::StorageError(format!("cannot read {}: {}", path.display(), e)))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), CoachError> {
        let path = self.path_for(key)?;
        // Readers never see a partially written file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| CoachError::StorageError(format!("cannot write {}: {}", path.display(), e)))
    }
}
