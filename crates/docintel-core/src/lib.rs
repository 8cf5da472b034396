//! # Docintel Core
//!
//! The extensibility core every feature is built on.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       CoreApi                            │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐│
//! │  │  Documents  │ │     Ui      │ │      Settings       ││
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘│
//! │         │               │                  │             │
//! │  ┌──────┴───────────────┴──────────────────┴──┐         │
//! │  │          EventBus          Storage          │         │
//! │  └─────────────────────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────┘
//!              ▲                    ▲
//!        ┌─────┴─────┐        ┌─────┴─────┐
//!        │ Feature A │        │ Feature B │
//!        └───────────┘        └───────────┘
//! ```
//!
//! Features are handed one `Rc<CoreApi>` and talk to each other only by
//! publishing and observing [`Event`]s.
//!
//! ## Learning: Single-Threaded Sharing
//!
//! The host runs on one thread, so shared state uses `Rc` and `RefCell`
//! instead of `Arc` and locks. A `RefCell` borrow is never held while a
//! callback runs, which is what lets callbacks re-enter the core.

pub mod api;
pub mod config;
pub mod document;
pub mod event;
pub mod storage;

pub use api::{Container, CoreApi, Documents, Settings, Severity, Ui, UploadTicket};
pub use config::{BackendKind, Config, ConfigError, StorageConfig, UploadConfig};
pub use document::{Document, DocumentContent, DocumentId, FileHandle, FileSource};
pub use event::{Event, EventBus, EventKind, EventName, EventStream, Handler, Subscription};
pub use storage::{FileBackend, MemoryBackend, Storage, StorageBackend, StorageError};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Event name must not be empty")]
    EmptyEventName,

    #[error("Event name is reserved for a built-in event: {0}")]
    ReservedEventName(String),

    #[error("Invalid storage prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
