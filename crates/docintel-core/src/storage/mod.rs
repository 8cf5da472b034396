//! Namespaced persistence for settings and documents.
//!
//! ## Learning: Async Contracts over Sync Stores
//!
//! Every [`Storage`] operation is an `async fn` even though today's
//! backends answer immediately. Callers already `.await` them, so a
//! backend that really suspends (a network store) can replace the local
//! one without touching any caller.
//!
//! Failures never reach the caller as errors: `save` reports `false`,
//! `load` falls back to the default, and both log what went wrong.

mod backend;

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};

use crate::{CoreError, CoreResult};

/// Namespace used when none is configured.
pub const DEFAULT_PREFIX: &str = "docIntel";

/// Separates the namespace from the logical key. Never part of a prefix.
const SEPARATOR: char = ':';

/// A backend shared by every [`Storage`] built on it.
pub type SharedBackend = Rc<RefCell<dyn StorageBackend>>;

/// Wraps a backend for sharing.
pub fn shared<B: StorageBackend + 'static>(backend: B) -> SharedBackend {
    Rc::new(RefCell::new(backend))
}

/// Backend-level storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key/value persistence confined to one namespace.
///
/// Keys are written as `<prefix>:<key>`. Because the prefix can't contain
/// `:`, two namespaces never see each other's keys, whatever keys callers
/// choose.
#[derive(Clone)]
pub struct Storage {
    prefix: Rc<str>,
    backend: SharedBackend,
}

impl Storage {
    /// Creates a storage namespace over `backend`.
    pub fn new(prefix: impl Into<String>, backend: SharedBackend) -> CoreResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains(SEPARATOR) {
            return Err(CoreError::InvalidPrefix(prefix));
        }
        Ok(Self {
            prefix: prefix.into(),
            backend,
        })
    }

    /// Creates a storage over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.into(),
            backend: shared(MemoryBackend::new()),
        }
    }

    /// Returns the namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}{}{}", self.prefix, SEPARATOR, key)
    }

    /// Serializes and stores `value`. Returns false on any failure.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(key, error = %e, "Storage save failed: value not serializable");
                return false;
            }
        };

        let physical = self.physical_key(key);
        match self.backend.borrow_mut().set_item(&physical, serialized) {
            Ok(()) => {
                tracing::trace!(key, "saved");
                true
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Storage save failed");
                false
            }
        }
    }

    /// Loads the value under `key`, or `default` if absent or unreadable.
    pub async fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.load_opt(key).await.unwrap_or(default)
    }

    /// Loads the value under `key`, or `None` if absent or unreadable.
    pub async fn load_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let physical = self.physical_key(key);
        let raw = match self.backend.borrow().get_item(&physical) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!(key, error = %e, "Storage load failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage load failed: unreadable value");
                None
            }
        }
    }

    /// Deletes `key`. Absent keys are ignored.
    pub async fn remove(&self, key: &str) {
        let physical = self.physical_key(key);
        if let Err(e) = self.backend.borrow_mut().remove_item(&physical) {
            tracing::error!(key, error = %e, "Storage remove failed");
        }
    }

    /// Returns the logical keys in this namespace.
    pub async fn keys(&self) -> Vec<String> {
        let head = self.physical_key("");
        let mut keys: Vec<String> = self
            .backend
            .borrow()
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(head.as_str()).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    /// Returns true if `key` holds a value.
    pub async fn contains(&self, key: &str) -> bool {
        let physical = self.physical_key(key);
        matches!(self.backend.borrow().get_item(&physical), Ok(Some(_)))
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
