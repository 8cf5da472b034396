//! Document records and raw file handles.
//!
//! ## Learning: Type Aliases and Newtypes
//!
//! `DocumentId` is a newtype wrapper around `String`. This provides:
//! - Type safety: Can't accidentally pass a storage key as a document ID
//! - Encapsulation: Can change the underlying type without breaking APIs
//! - Documentation: The type name explains its purpose

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Schema version written into every newly built document record.
///
/// Records persisted before the tag existed load as version `0`.
pub const SCHEMA_VERSION: u32 = 1;

/// Unique identifier for a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a new unique document ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum DocumentContent {
    /// Decoded text
    Text(String),
    /// Raw bytes, stored as base64
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl DocumentContent {
    /// Returns the text, if this is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the body length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A document held by the core and persisted under `document_<id>`.
///
/// ## Learning: Plain Data Records
///
/// Unlike stateful objects, a record like this is just data: public
/// fields, `Clone`, and serde derives. Behavior lives in whoever owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier
    pub id: DocumentId,

    /// Display name (usually the file name)
    pub name: String,

    /// MIME type
    pub mime_type: String,

    /// Size in bytes
    pub size: u64,

    /// When the document was ingested
    pub uploaded_at: DateTime<Utc>,

    /// Document body
    pub content: DocumentContent,

    /// Free-form metadata contributed by features
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Record format version
    #[serde(default)]
    pub schema_version: u32,
}

impl Document {
    /// Creates a text document with a fresh ID.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: DocumentId::new(),
            name: name.into(),
            mime_type: "text/plain".to_string(),
            size: text.len() as u64,
            uploaded_at: Utc::now(),
            content: DocumentContent::Text(text),
            metadata: Map::new(),
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Builds a document from an uploaded file and its decoded body.
    pub fn from_upload(file: &FileHandle, content: DocumentContent) -> Self {
        Self {
            id: DocumentId::new(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.size,
            uploaded_at: Utc::now(),
            content,
            metadata: Map::new(),
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Replaces the ID.
    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = id.into();
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the text body, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_text()
    }

    /// Overwrites the body with `text`.
    pub fn set_text(&mut self, text: String) {
        self.size = text.len() as u64;
        self.content = DocumentContent::Text(text);
    }

    /// Returns the storage key for a document ID.
    pub fn storage_key(id: &DocumentId) -> String {
        format!("document_{id}")
    }
}

/// Where the bytes of a [`FileHandle`] live.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// A file on disk, read lazily
    Path(PathBuf),
    /// Bytes already in memory
    Memory(Vec<u8>),
}

/// A raw file handed to the core for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    /// File name without directories
    pub name: String,
    /// MIME type
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Where to read the bytes from
    pub source: FileSource,
}

impl FileHandle {
    /// Creates a handle over in-memory bytes.
    pub fn in_memory(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            source: FileSource::Memory(bytes),
        }
    }

    /// Opens a handle to a file on disk.
    ///
    /// Only metadata is read here; the MIME type is guessed from the
    /// extension.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file: {}", path.display()),
            ));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            name,
            mime_type,
            size: meta.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Reads all bytes.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(path) => tokio::fs::read(path).await,
            FileSource::Memory(bytes) => Ok(bytes.clone()),
        }
    }

    /// Reads all bytes as UTF-8 text.
    pub async fn read_text(&self) -> io::Result<String> {
        let bytes = self.read().await?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_record_format() {
        let doc = Document::text("notes.txt", "hello")
            .with_id("42")
            .with_metadata("pages", json!(1));

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["id"], json!("42"));
        assert_eq!(value["mimeType"], json!("text/plain"));
        assert_eq!(value["content"], json!({"kind": "text", "data": "hello"}));
        assert_eq!(value["schemaVersion"], json!(SCHEMA_VERSION));
        assert_eq!(Document::storage_key(&doc.id), "document_42");
    }

    #[test]
    fn test_binary_content_is_base64() {
        let content = DocumentContent::Binary(vec![0x25, 0x50, 0x44, 0x46]);
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value, json!({"kind": "binary", "data": "JVBERg=="}));

        let back: DocumentContent = serde_json::from_value(value).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn test_legacy_record_without_version() {
        let record = json!({
            "id": "1",
            "name": "a.txt",
            "mimeType": "text/plain",
            "size": 2,
            "uploadedAt": "2024-01-01T00:00:00Z",
            "content": {"kind": "text", "data": "hi"}
        });
        let doc: Document = serde_json::from_value(record).unwrap();
        assert_eq!(doc.schema_version, 0);
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.text_content(), Some("hi"));
    }

    #[test]
    fn test_set_text_overwrites_binary() {
        let file = FileHandle::in_memory("a.pdf", "application/pdf", vec![1, 2, 3]);
        let mut doc = Document::from_upload(&file, DocumentContent::Binary(vec![1, 2, 3]));
        assert_eq!(doc.text_content(), None);

        doc.set_text("extracted".to_string());
        assert_eq!(doc.text_content(), Some("extracted"));
        assert_eq!(doc.size, 9);
    }

    #[tokio::test]
    async fn test_file_handle_guesses_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("report.PDF", "application/pdf"),
            ("notes.txt", "text/plain"),
            ("book.epub", "application/epub+zip"),
            ("blob.zzqx", "application/octet-stream"),
        ];
        for (name, expected) in cases {
            let path = dir.path().join(name);
            std::fs::write(&path, b"x").unwrap();
            let file = FileHandle::from_path(&path).await.unwrap();
            assert_eq!(file.mime_type, expected, "{name}");
        }
    }

    #[tokio::test]
    async fn test_file_handle_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello world").unwrap();

        let file = FileHandle::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.size, 11);
        assert_eq!(file.read_text().await.unwrap(), "hello world");

        assert!(FileHandle::from_path(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_utf8_text() {
        let file = FileHandle::in_memory("bad.txt", "text/plain", vec![0xff, 0xfe]);
        let err = file.read_text().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
