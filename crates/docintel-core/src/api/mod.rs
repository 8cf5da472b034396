//! The capability surface handed to every feature.
//!
//! ## Learning: The Facade Pattern
//!
//! `CoreApi` acts as a facade, providing a simple interface to
//! the event bus, storage and document slot. A feature only needs
//! this one object, never the subsystems behind it.
//!
//! Calls that change state publish an event; calls that ask for
//! something return a value. Nothing here calls into a feature.

mod documents;
mod settings;
mod ui;

pub use documents::{Documents, UploadTicket};
pub use settings::Settings;
pub use ui::{Container, Severity, Ui};

use crate::config::{BackendKind, Config};
use crate::event::EventBus;
use crate::storage::{self, FileBackend, MemoryBackend, Storage};
use crate::CoreResult;

/// The capability set a feature is constructed with.
///
/// ## Thread Safety
///
/// `CoreApi` lives on the host's single thread and is shared as
/// `Rc<CoreApi>`. Every call runs to completion before the next begins,
/// so no locking is needed.
pub struct CoreApi {
    /// Current-document slot
    documents: Documents,

    /// Mount points and notifications
    ui: Ui,

    /// Namespaced settings
    settings: Settings,

    /// Persistence shared with the sub-surfaces
    storage: Storage,

    /// Event bus shared with the sub-surfaces
    events: EventBus,
}

impl CoreApi {
    /// Creates the capability surface over `storage` with a fresh bus.
    pub fn new(storage: Storage) -> Self {
        let events = EventBus::new();
        Self {
            documents: Documents::new(events.clone(), storage.clone()),
            ui: Ui::new(events.clone()),
            settings: Settings::new(events.clone(), storage.clone()),
            storage,
            events,
        }
    }

    /// Creates a surface whose storage lives only in memory.
    pub fn in_memory() -> Self {
        Self::new(Storage::in_memory())
    }

    /// Creates a surface from host configuration.
    pub fn from_config(config: &Config) -> CoreResult<Self> {
        let backend = match config.storage.backend {
            BackendKind::Memory => storage::shared(MemoryBackend::new()),
            BackendKind::File => {
                let path = config.storage.resolved_path()?;
                tracing::info!(path = %path.display(), "using file storage");
                storage::shared(FileBackend::open(path)?)
            }
        };
        let storage = Storage::new(config.storage.prefix.clone(), backend)?;
        Ok(Self::new(storage))
    }

    /// Document operations.
    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    /// UI operations.
    pub fn ui(&self) -> &Ui {
        &self.ui
    }

    /// Settings operations.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Direct storage access.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Direct event bus access.
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

impl Default for CoreApi {
    fn default() -> Self {
        Self::in_memory()
    }
}
