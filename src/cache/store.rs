//! Durable storage tier for the TTL cache
//!
//! A `DurableStore` persists raw serialized entries by key. `DiskStore` keeps
//! one JSON file per key in an XDG-compliant cache directory, named by the
//! SHA-256 of the key; `MemoryStore` keeps them in a map. Both can enforce a byte quota, and both report a full
//! quota as `StoreError::QuotaExceeded` so the cache can purge and retry.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a durable store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing would exceed the configured quota
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: u64, quota: u64 },

    /// Filesystem failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry file that is not a stored record
    #[error("Corrupt storage record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key/value persistence used behind the in-memory cache tier
pub trait DurableStore: Send + Sync + fmt::Debug {
    /// Loads the raw value stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Stores `raw` under `key`, replacing any previous value
    fn save(&self, key: &str, raw: &str) -> Result<(), StoreError>;
    /// Removes `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Lists all stored keys
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Stores cache entries as JSON files on disk
///
/// Uses `~/.cache/roadwatch/` on Linux, or the equivalent XDG path on other
/// platforms. File names are fixed-length key hashes, so key length is not
/// limited by the filesystem; the key itself is stored inside the file.
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Directory where entry files are stored
    dir: PathBuf,
    /// Maximum total size of all entry files, in bytes
    quota_bytes: Option<u64>,
}

impl DiskStore {
    /// Creates a store in the platform cache directory
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "roadwatch")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store in the platform data directory
    ///
    /// Used for records that must outlive cache clears, such as scheduler state.
    pub fn in_data_dir() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "roadwatch")?;
        Some(Self::with_dir(project_dirs.data_dir().to_path_buf()))
    }

    /// Creates a store rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            quota_bytes: None,
        }
    }

    /// Limits the total size of stored entries
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key_to_filename(key))
    }

    fn read_record(path: &Path) -> Result<Option<DiskRecord>, StoreError> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Total size of stored entries, ignoring the file for `except`
    fn used_bytes(&self, except: &PathBuf) -> Result<u64, StoreError> {
        let mut total = 0;
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.path() == *except {
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

impl DurableStore for DiskStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let record = Self::read_record(&self.entry_path(key))?;
        // a hash collision reads as a miss
        Ok(record.filter(|r| r.key == key).map(|r| r.raw))
    }

    fn save(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let record = serde_json::to_string(&DiskRecord {
            key: key.to_string(),
            raw: raw.to_string(),
        })?;

        if let Some(quota) = self.quota_bytes {
            let needed = self.used_bytes(&path)? + record.len() as u64;
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }

        fs::write(path, record)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") || !path.is_file() {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) => keys.push(record.key),
                Ok(None) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable cache file"),
            }
        }
        Ok(keys)
    }
}

/// Keeps raw entries in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(quota) = self.quota_bytes {
            let used: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let needed = used + raw.len() as u64;
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }
        entries.insert(key.to_string(), raw.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.keys().cloned().collect())
    }
}

/// What a `DiskStore` file holds
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    raw: String,
}

/// Hex SHA-256 of the key, so every file name has the same length
fn key_to_filename(key: &str) -> String {
    format!("{:x}.json", Sha256::digest(key.as_bytes()))
}
