//! Settings capability.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::event::{Event, EventBus};
use crate::storage::Storage;

fn storage_key(key: &str) -> String {
    format!("settings_{key}")
}

/// Settings sub-surface of [`CoreApi`](super::CoreApi).
///
/// Every read goes to storage; nothing is cached here.
pub struct Settings {
    events: EventBus,
    storage: Storage,
}

impl Settings {
    pub(crate) fn new(events: EventBus, storage: Storage) -> Self {
        Self { events, storage }
    }

    /// Reads a setting, or `default` if unset.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.storage.load(&storage_key(key), default).await
    }

    /// Reads a setting, or `None` if unset.
    pub async fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.storage.load_opt(&storage_key(key)).await
    }

    /// Persists a setting and publishes `settings:changed`.
    ///
    /// Nothing is published when the write fails.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "Setting is not serializable");
                return false;
            }
        };

        if !self.storage.save(&storage_key(key), &value).await {
            tracing::warn!(key, "Setting was not persisted");
            return false;
        }

        tracing::debug!(key, "setting changed");
        self.events.publish(Event::SettingsChanged {
            key: key.to_string(),
            value,
        });
        true
    }
}
