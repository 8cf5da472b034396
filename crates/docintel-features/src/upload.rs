//! Upload feature: validates, reads and stores incoming files.
//!
//! Files arrive as `document:upload:requested` events and are queued;
//! [`UploadFeature::process_pending`] ingests them. A successful upload
//! fills the current-document slot, saves the record under
//! `document_<id>` and publishes `document:uploaded`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::{Rc, Weak};
use std::time::Duration;

use docintel_core::config::{MIB, UploadConfig};
use docintel_core::{
    Container, CoreApi, Document, DocumentContent, DocumentId, Event, EventKind, FileHandle,
    Severity, Subscription,
};

use crate::{API_VERSION, Feature, FeatureError, FeatureManifest};

/// Mount point the upload feature renders into.
pub const UPLOAD_CONTAINER: &str = "upload-container";

/// Why a file was refused before reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// MIME type not in the allow-list
    UnsupportedType(String),
    /// File larger than the limit
    TooLarge { size: u64, max: u64 },
}

/// Result of ingesting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Stored and announced
    Loaded(DocumentId),
    /// Refused by validation
    Rejected(RejectReason),
    /// Could not be read
    Failed(String),
}

struct Inner {
    manifest: FeatureManifest,
    api: Rc<CoreApi>,
    config: UploadConfig,
    container: RefCell<Option<Rc<Container>>>,
    pending: RefCell<VecDeque<FileHandle>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

/// Handles file ingestion.
///
/// Cloning yields another handle to the same feature, so the host can keep
/// one while the [`FeatureManager`](crate::FeatureManager) owns another.
#[derive(Clone)]
pub struct UploadFeature {
    inner: Rc<Inner>,
}

impl UploadFeature {
    /// Creates the feature. Nothing is subscribed until activation.
    pub fn new(api: Rc<CoreApi>, config: UploadConfig) -> Self {
        let manifest = FeatureManifest {
            id: "upload".to_string(),
            name: "Upload".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Validates and ingests PDF and text files".to_string(),
            api_version: API_VERSION.to_string(),
        };
        Self {
            inner: Rc::new(Inner {
                manifest,
                api,
                config,
                container: RefCell::new(None),
                pending: RefCell::new(VecDeque::new()),
                subscriptions: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns how many files wait for ingestion.
    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Ingests every queued file in arrival order.
    ///
    /// Stops early, leaving the queue intact, while the container is
    /// disabled by `document:processing:start`.
    pub async fn process_pending(&self) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::new();
        loop {
            if !self.is_enabled() {
                tracing::debug!(pending = self.pending(), "upload disabled, leaving queue");
                break;
            }
            let Some(file) = self.inner.pending.borrow_mut().pop_front() else {
                break;
            };
            outcomes.push(self.handle_file(file).await);
        }
        outcomes
    }

    /// Validates, reads and stores one file.
    pub async fn handle_file(&self, file: FileHandle) -> UploadOutcome {
        let inner = &self.inner;
        tracing::info!(name = %file.name, mime = %file.mime_type, size = file.size, "File selected");

        if !inner.config.allowed_types.iter().any(|t| *t == file.mime_type) {
            self.show_status("Please select a PDF or TXT file", Some(Severity::Error));
            return UploadOutcome::Rejected(RejectReason::UnsupportedType(file.mime_type));
        }

        if file.size > inner.config.max_size {
            let max = inner.config.max_size;
            self.show_status(
                format!("File too large (max {})", format_limit(max)),
                Some(Severity::Error),
            );
            return UploadOutcome::Rejected(RejectReason::TooLarge {
                size: file.size,
                max,
            });
        }

        self.show_status("Processing...", None);

        let content = match read_content(&file).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(name = %file.name, error = %e, "Upload error");
                self.show_status("Failed to load file", Some(Severity::Error));
                inner
                    .api
                    .ui()
                    .show_notification(format!("Failed to load file: {e}"), Severity::Error);
                return UploadOutcome::Failed(e.to_string());
            }
        };

        let document = Document::from_upload(&file, content);
        let id = document.id.clone();

        inner.api.documents().set_current(document.clone());

        if !inner
            .api
            .storage()
            .save(&Document::storage_key(&id), &document)
            .await
        {
            tracing::warn!(%id, "Document kept in memory only");
        }

        inner.api.events().publish(Event::DocumentUploaded {
            document,
            file: file.clone(),
        });

        if let Some(container) = inner.container.borrow().as_ref() {
            container.set_status_for(
                format!("Loaded: {}", file.name),
                Some(Severity::Success),
                Duration::from_millis(inner.config.status_timeout_ms),
            );
        }
        UploadOutcome::Loaded(id)
    }

    fn is_enabled(&self) -> bool {
        self.inner
            .container
            .borrow()
            .as_ref()
            .is_none_or(|c| c.is_enabled())
    }

    fn show_status(&self, message: impl Into<String>, class: Option<Severity>) {
        if let Some(container) = self.inner.container.borrow().as_ref() {
            container.set_status(message, class);
        }
    }

    fn subscribe(&self, kind: EventKind, on_event: fn(&Inner, &Event)) {
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let subscription = self.inner.api.events().subscribe(kind, move |event| {
            if let Some(inner) = weak.upgrade() {
                on_event(&inner, event);
            }
        });
        self.inner.subscriptions.borrow_mut().push(subscription);
    }
}

impl Feature for UploadFeature {
    fn manifest(&self) -> &FeatureManifest {
        &self.inner.manifest
    }

    fn activate(&mut self) -> Result<(), FeatureError> {
        tracing::info!("Upload feature initializing...");

        let Some(container) = self.inner.api.ui().get_container(UPLOAD_CONTAINER) else {
            tracing::error!("Upload container not found");
            return Err(FeatureError::ContainerMissing(UPLOAD_CONTAINER.to_string()));
        };
        container.clear_status();
        container.set_enabled(true);
        *self.inner.container.borrow_mut() = Some(container);

        self.subscribe(EventKind::UploadRequested, |inner, event| {
            if let Event::UploadRequested { file } = event {
                inner.pending.borrow_mut().push_back(file.clone());
            }
        });
        self.subscribe(EventKind::DocumentClear, |inner, _| {
            if let Some(container) = inner.container.borrow().as_ref() {
                container.clear_status();
            }
            inner.pending.borrow_mut().clear();
        });
        self.subscribe(EventKind::ProcessingStart, |inner, _| {
            if let Some(container) = inner.container.borrow().as_ref() {
                container.set_enabled(false);
            }
        });
        self.subscribe(EventKind::ProcessingEnd, |inner, _| {
            if let Some(container) = inner.container.borrow().as_ref() {
                container.set_enabled(true);
            }
        });

        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), FeatureError> {
        for subscription in self.inner.subscriptions.borrow_mut().drain(..) {
            subscription.dispose();
        }
        self.inner.container.borrow_mut().take();
        Ok(())
    }
}

/// Renders a size limit the way the status line shows it.
fn format_limit(bytes: u64) -> String {
    const KIB: u64 = 1024;
    if bytes >= MIB {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Reads text files as text and everything else as raw bytes.
async fn read_content(file: &FileHandle) -> io::Result<DocumentContent> {
    if file.mime_type.starts_with("text/") {
        Ok(DocumentContent::Text(file.read_text().await?))
    } else {
        Ok(DocumentContent::Binary(file.read().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Rc<CoreApi>, Rc<Container>, UploadFeature) {
        let api = Rc::new(CoreApi::in_memory());
        let container = api.ui().register_container(UPLOAD_CONTAINER);
        let mut feature = UploadFeature::new(Rc::clone(&api), UploadConfig::default());
        feature.activate().unwrap();
        (api, container, feature)
    }

    fn text_file(name: &str, text: &str) -> FileHandle {
        FileHandle::in_memory(name, "text/plain", text.as_bytes().to_vec())
    }

    #[test]
    fn test_activation_requires_container() {
        let api = Rc::new(CoreApi::in_memory());
        let mut feature = UploadFeature::new(Rc::clone(&api), UploadConfig::default());

        assert!(matches!(
            feature.activate(),
            Err(FeatureError::ContainerMissing(_))
        ));
        assert_eq!(api.events().subscriber_count(&EventKind::UploadRequested), 0);
    }

    #[tokio::test]
    async fn test_upload_request_is_ingested() {
        let (api, container, feature) = setup();

        let uploaded = Rc::new(RefCell::new(Vec::new()));
        let uploaded_in = Rc::clone(&uploaded);
        let _s = api.events().subscribe(EventKind::DocumentUploaded, move |event| {
            if let Event::DocumentUploaded { document, file } = event {
                uploaded_in.borrow_mut().push((document.clone(), file.name.clone()));
            }
        });

        api.documents().upload(text_file("notes.txt", "hello"));
        assert_eq!(feature.pending(), 1);

        let outcomes = feature.process_pending().await;
        let [UploadOutcome::Loaded(id)] = outcomes.as_slice() else {
            panic!("unexpected outcomes: {outcomes:?}");
        };

        assert_eq!(api.documents().get_text(), "hello");
        assert_eq!(container.status(), "Loaded: notes.txt");
        assert_eq!(container.status_class(), Some(Severity::Success));

        let uploaded = uploaded.borrow();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(&uploaded[0].0.id, id);
        assert_eq!(uploaded[0].1, "notes.txt");

        let stored: Document = api
            .storage()
            .load_opt(&Document::storage_key(id))
            .await
            .unwrap();
        assert_eq!(stored, uploaded[0].0);
    }

    #[tokio::test]
    async fn test_second_upload_replaces_first() {
        let (api, _container, feature) = setup();

        feature.handle_file(text_file("one.txt", "first")).await;
        feature.handle_file(text_file("two.txt", "second")).await;

        assert_eq!(api.documents().get_text(), "second");
        assert_eq!(api.documents().current().unwrap().name, "two.txt");
    }

    #[tokio::test]
    async fn test_pdf_is_kept_as_binary() {
        let (api, _container, feature) = setup();
        let pdf = FileHandle::in_memory("paper.pdf", "application/pdf", b"%PDF-1.7".to_vec());

        let outcome = feature.handle_file(pdf).await;
        assert!(matches!(outcome, UploadOutcome::Loaded(_)));

        let current = api.documents().current().unwrap();
        assert_eq!(current.content, DocumentContent::Binary(b"%PDF-1.7".to_vec()));
        assert_eq!(api.documents().get_text(), "");
    }

    #[tokio::test]
    async fn test_validation_rejects() {
        let (api, container, feature) = setup();

        let image = FileHandle::in_memory("cat.png", "image/png", vec![0; 4]);
        assert_eq!(
            feature.handle_file(image).await,
            UploadOutcome::Rejected(RejectReason::UnsupportedType("image/png".to_string()))
        );
        assert_eq!(container.status(), "Please select a PDF or TXT file");
        assert_eq!(container.status_class(), Some(Severity::Error));

        let mut huge = text_file("big.txt", "x");
        huge.size = 11 * MIB;
        assert_eq!(
            feature.handle_file(huge).await,
            UploadOutcome::Rejected(RejectReason::TooLarge {
                size: 11 * MIB,
                max: 10 * MIB,
            })
        );
        assert_eq!(container.status(), "File too large (max 10MB)");
        assert!(api.documents().current().is_none());
    }

    #[tokio::test]
    async fn test_small_limit_is_reported_in_smaller_units() {
        let api = Rc::new(CoreApi::in_memory());
        let container = api.ui().register_container(UPLOAD_CONTAINER);
        let config = UploadConfig {
            max_size: 512 * 1024,
            ..UploadConfig::default()
        };
        let mut feature = UploadFeature::new(Rc::clone(&api), config);
        feature.activate().unwrap();

        let mut big = text_file("big.txt", "x");
        big.size = MIB;
        assert!(matches!(
            feature.handle_file(big).await,
            UploadOutcome::Rejected(RejectReason::TooLarge { .. })
        ));
        assert_eq!(container.status(), "File too large (max 512KB)");

        assert_eq!(format_limit(10 * MIB), "10MB");
        assert_eq!(format_limit(2048), "2KB");
        assert_eq!(format_limit(100), "100 bytes");
    }

    #[tokio::test]
    async fn test_success_status_clears_after_timeout() {
        let api = Rc::new(CoreApi::in_memory());
        let container = api.ui().register_container(UPLOAD_CONTAINER);
        let config = UploadConfig {
            status_timeout_ms: 0,
            ..UploadConfig::default()
        };
        let mut feature = UploadFeature::new(Rc::clone(&api), config);
        feature.activate().unwrap();

        feature.handle_file(text_file("a.txt", "a")).await;
        assert_eq!(container.status(), "");
        assert_eq!(container.status_class(), None);

        // Errors stay until replaced
        let image = FileHandle::in_memory("cat.png", "image/png", vec![0; 4]);
        feature.handle_file(image).await;
        assert_eq!(container.status(), "Please select a PDF or TXT file");
    }

    #[tokio::test]
    async fn test_read_failure_notifies() {
        let (api, container, feature) = setup();

        let notified = Rc::new(RefCell::new(Vec::new()));
        let notified_in = Rc::clone(&notified);
        let _s = api.events().subscribe(EventKind::Notification, move |event| {
            if let Event::Notification { message, severity } = event {
                notified_in.borrow_mut().push((message.clone(), *severity));
            }
        });

        let broken = FileHandle::in_memory("bad.txt", "text/plain", vec![0xff, 0xfe]);
        let outcome = feature.handle_file(broken).await;

        assert!(matches!(outcome, UploadOutcome::Failed(_)));
        assert_eq!(container.status(), "Failed to load file");
        let notified = notified.borrow();
        assert_eq!(notified.len(), 1);
        assert!(notified[0].0.starts_with("Failed to load file: "));
        assert_eq!(notified[0].1, Severity::Error);
        assert!(api.documents().current().is_none());
    }

    #[tokio::test]
    async fn test_reads_from_disk() {
        let (api, _container, feature) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.txt");
        std::fs::write(&path, "from disk").unwrap();

        let file = FileHandle::from_path(&path).await.unwrap();
        api.documents().upload(file);
        feature.process_pending().await;

        assert_eq!(api.documents().get_text(), "from disk");
    }

    #[tokio::test]
    async fn test_processing_events_pause_queue() {
        let (api, container, feature) = setup();

        api.events().publish(Event::ProcessingStart);
        assert!(!container.is_enabled());

        api.documents().upload(text_file("later.txt", "later"));
        assert!(feature.process_pending().await.is_empty());
        assert_eq!(feature.pending(), 1);

        api.events().publish(Event::ProcessingEnd);
        assert!(container.is_enabled());
        assert_eq!(feature.process_pending().await.len(), 1);
        assert_eq!(api.documents().get_text(), "later");
    }

    #[tokio::test]
    async fn test_clear_resets_status_and_queue() {
        let (api, container, feature) = setup();

        feature.handle_file(text_file("a.txt", "a")).await;
        api.documents().upload(text_file("b.txt", "b"));

        api.events().publish(Event::DocumentClear);
        assert_eq!(container.status(), "");
        assert_eq!(feature.pending(), 0);
    }

    #[test]
    fn test_deactivate_unsubscribes() {
        let (api, _container, mut feature) = setup();
        assert_eq!(api.events().subscriber_count(&EventKind::UploadRequested), 1);

        feature.deactivate().unwrap();
        for kind in [
            EventKind::UploadRequested,
            EventKind::DocumentClear,
            EventKind::ProcessingStart,
            EventKind::ProcessingEnd,
        ] {
            assert_eq!(api.events().subscriber_count(&kind), 0);
        }

        api.documents().upload(text_file("x.txt", "x"));
        assert_eq!(feature.pending(), 0);
    }
}
