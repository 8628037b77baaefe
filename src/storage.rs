//! Local blob storage.
//!
//! The store persists its serialized task map through this trait. Writes are
//! infallible at the API level: implementations swallow and log failures
//! (storage quota, unwritable directory) so the in-memory state stays
//! authoritative for the session.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key-value blob store with get/set/remove.
pub trait BlobStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }
}

/// File-backed storage, one file per key under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage rooted at the platform data directory (`…/taskcal`).
    pub fn in_user_data_dir() -> Self {
        let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("taskcal"))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStorage for JsonFileStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.key_path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(error = %err, dir = %self.dir.display(), "failed to create storage dir");
            return;
        }
        if let Err(err) = std::fs::write(self.key_path(key), value) {
            tracing::warn!(error = %err, key, "failed to persist blob");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(err) = std::fs::remove_file(self.key_path(key)) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %err, key, "failed to remove blob");
            }
        }
    }
}
