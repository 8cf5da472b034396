//! Document capability: the single current-document slot.

use std::cell::RefCell;

use serde_json::{Map, Value};

use crate::document::{Document, DocumentId, FileHandle};
use crate::event::{Event, EventBus};
use crate::storage::Storage;

/// Provisional descriptor returned by [`Documents::upload`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTicket {
    pub id: DocumentId,
    pub file: FileHandle,
}

/// Document sub-surface of [`CoreApi`](super::CoreApi).
///
/// Holds at most one current document. It is replaced wholesale by
/// [`Documents::set_current`] and is only persisted on request.
pub struct Documents {
    current: RefCell<Option<Document>>,
    events: EventBus,
    storage: Storage,
}

impl Documents {
    pub(crate) fn new(events: EventBus, storage: Storage) -> Self {
        Self {
            current: RefCell::new(None),
            events,
            storage,
        }
    }

    /// Hands `file` off for ingestion by publishing
    /// `document:upload:requested`.
    ///
    /// Nothing is read or stored here; whichever feature listens does that.
    pub fn upload(&self, file: FileHandle) -> UploadTicket {
        let ticket = UploadTicket {
            id: DocumentId::new(),
            file: file.clone(),
        };
        tracing::debug!(name = %file.name, provisional_id = %ticket.id, "upload requested");
        self.events.publish(Event::UploadRequested { file });
        ticket
    }

    /// Returns a copy of the current document.
    pub fn current(&self) -> Option<Document> {
        self.current.borrow().clone()
    }

    /// Runs `f` against the current document without cloning it.
    ///
    /// `f` must not replace or edit the slot; that would panic.
    pub fn with_current<R>(&self, f: impl FnOnce(Option<&Document>) -> R) -> R {
        f(self.current.borrow().as_ref())
    }

    /// Replaces the current document, returning the previous one.
    pub fn set_current(&self, document: Document) -> Option<Document> {
        tracing::debug!(id = %document.id, name = %document.name, "current document replaced");
        self.current.replace(Some(document))
    }

    /// Empties the slot, returning what it held.
    pub fn clear_current(&self) -> Option<Document> {
        self.current.take()
    }

    /// Returns the current document's text, or an empty string.
    pub fn get_text(&self) -> String {
        self.current
            .borrow()
            .as_ref()
            .and_then(Document::text_content)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Overwrites the current document's text and publishes
    /// `document:text:updated`. Does nothing without a current document.
    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut slot = self.current.borrow_mut();
            let Some(document) = slot.as_mut() else {
                tracing::trace!("set_text ignored: no current document");
                return;
            };
            document.set_text(text.clone());
        }
        self.events.publish(Event::TextUpdated { text });
    }

    /// Returns the current document's metadata, or an empty map.
    pub fn get_metadata(&self) -> Map<String, Value> {
        self.current
            .borrow()
            .as_ref()
            .map(|d| d.metadata.clone())
            .unwrap_or_default()
    }

    /// Saves the current document under `document_<id>`.
    ///
    /// Returns false when there is nothing to save or the write failed.
    pub async fn persist_current(&self) -> bool {
        let Some(document) = self.current() else {
            return false;
        };
        self.storage
            .save(&Document::storage_key(&document.id), &document)
            .await
    }

    /// Loads a stored document into the slot.
    ///
    /// Returns false when no readable record exists for `id`.
    pub async fn restore(&self, id: &DocumentId) -> bool {
        match self
            .storage
            .load_opt::<Document>(&Document::storage_key(id))
            .await
        {
            Some(document) => {
                self.set_current(document);
                true
            }
            None => {
                tracing::debug!(%id, "no stored document");
                false
            }
        }
    }
}
