//! Synchronous key/value stores behind [`Storage`](super::Storage).
//!
//! A backend knows nothing about namespaces or JSON values; it stores
//! opaque strings under opaque keys, like a browser's local store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::StorageError;

/// A synchronous string store.
pub trait StorageBackend {
    /// Returns the value stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&mut self, key: &str, value: String) -> Result<(), StorageError>;

    /// Deletes `key`. Deleting an absent key succeeds.
    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;

    /// Returns every stored key.
    fn keys(&self) -> Vec<String>;
}

/// In-process store with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryBackend {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding at most `bytes` of keys plus values.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            items: HashMap::new(),
            quota: Some(bytes),
        }
    }

    /// Returns bytes used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.items.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            let replaced = self.items.get(key).map_or(0, |old| key.len() + old.len());
            let used = self.used_bytes() - replaced;
            let needed = key.len() + value.len();
            if used + needed > quota {
                return Err(StorageError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

/// Store backed by a single JSON object file.
///
/// The file is read once at open and rewritten on every change.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    items: HashMap<String, String>,
}

impl FileBackend {
    /// Opens the store at `path`, creating it lazily on first write.
    ///
    /// A file that is not a JSON object of strings is moved aside to
    /// `<path>.corrupt` and the store starts empty. Only failing to read
    /// the file is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let items = if path.exists() {
            let contents = fs::read(&path)?;
            match serde_json::from_slice(&contents) {
                Ok(items) => items,
                Err(e) => {
                    Self::quarantine(&path, &e.to_string());
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), entries = items.len(), "opened file store");
        Ok(Self { path, items })
    }

    /// Returns where an unreadable store file is moved to.
    pub fn corrupt_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    fn quarantine(path: &Path, reason: &str) {
        let target = Self::corrupt_path(path);
        match fs::rename(path, &target) {
            Ok(()) => tracing::warn!(
                path = %path.display(),
                moved_to = %target.display(),
                %reason,
                "store file unreadable, starting empty"
            ),
            // The next write overwrites it
            Err(e) => tracing::warn!(
                path = %path.display(),
                %reason,
                error = %e,
                "store file unreadable and could not be moved, starting empty"
            ),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.items)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        let previous = self.items.insert(key.to_string(), value);
        if let Err(e) = self.flush() {
            // Keep memory and disk in agreement
            match previous {
                Some(old) => self.items.insert(key.to_string(), old),
                None => self.items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        if let Some(old) = self.items.remove(key) {
            if let Err(e) = self.flush() {
                self.items.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}
