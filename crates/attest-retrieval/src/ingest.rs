//! Document ingestion: governance gate, chunking, persistence.

use std::path::Path;
use std::sync::Arc;

use attest_core::{AttestError, ChunkingConfig, DocumentMetadata};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::chunk_store::ChunkStore;
use crate::chunker;
use crate::governance;

/// Turns a source file into plain text.
pub trait TextExtractor: Send + Sync {
    /// Extract the text content of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Config`] for unsupported file types and
    /// [`AttestError::Io`] if the file cannot be read.
    fn extract(&self, path: &Path) -> Result<String, AttestError>;
}

/// Reads UTF-8 `.txt` and `.md` files as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, AttestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("txt" | "md" | "markdown") => Ok(std::fs::read_to_string(path)?),
            _ => Err(AttestError::Config(format!(
                "unsupported file type: {}",
                path.display()
            ))),
        }
    }
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    /// Length of the extracted text in characters.
    pub text_length: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Validates, chunks and stores approved documents.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use attest_core::{ChunkingConfig, DocumentMetadata};
/// use attest_retrieval::chunk_store::ChunkStore;
/// use attest_retrieval::ingest::Ingestor;
///
/// let dir = tempfile::tempdir().unwrap();
/// let ingestor = Ingestor::new(Arc::new(ChunkStore::new(dir.path())), ChunkingConfig::default());
///
/// let meta = DocumentMetadata::new("Leave", "HR", "1", true, "hr-lead");
/// let report = ingestor.ingest_text("employees get twenty days", meta).unwrap();
/// assert_eq!(report.chunk_count, 1);
///
/// let draft = DocumentMetadata::new("Draft", "HR", "0", false, "");
/// assert!(ingestor.ingest_text("not yet", draft).is_err());
/// ```
pub struct Ingestor {
    chunks: Arc<ChunkStore>,
    chunking: ChunkingConfig,
    extractor: Box<dyn TextExtractor>,
}

impl Ingestor {
    /// Create an ingestor using the plain-text extractor.
    pub fn new(chunks: Arc<ChunkStore>, chunking: ChunkingConfig) -> Self {
        Self {
            chunks,
            chunking,
            extractor: Box::new(PlainTextExtractor),
        }
    }

    /// Replace the file extractor.
    pub fn with_extractor(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Ingest `text` as one document.
    ///
    /// A fresh UUID is assigned when `metadata.document_id` is `None`; an
    /// existing id overwrites that document's chunks.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::InvalidParameter`] for bad chunking parameters
    /// (checked before anything is written), [`AttestError::Governance`] for
    /// unapproved documents, and storage errors from the chunk store.
    pub fn ingest_text(
        &self,
        text: &str,
        metadata: DocumentMetadata,
    ) -> Result<IngestReport, AttestError> {
        self.chunking.validate()?;
        governance::validate_document(&metadata)?;

        let document_id = metadata
            .document_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let texts = chunker::chunk_with(text, &self.chunking)?;
        let chunk_count = self.chunks.save_chunks(&document_id, &texts, &metadata)?;

        info!(
            document_id = %document_id,
            title = %metadata.title,
            chunks = chunk_count,
            "ingested document"
        );

        Ok(IngestReport {
            document_id,
            text_length: text.chars().count(),
            chunk_count,
            ingested_at: Utc::now(),
        })
    }

    /// Extract `path` and ingest its text.
    ///
    /// # Errors
    ///
    /// Extraction errors, then the same as [`ingest_text`](Self::ingest_text).
    pub fn ingest_file(
        &self,
        path: &Path,
        metadata: DocumentMetadata,
    ) -> Result<IngestReport, AttestError> {
        // reject early so unapproved files are never read
        governance::validate_document(&metadata)?;
        let text = self.extractor.extract(path)?;
        self.ingest_text(&text, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingestor(dir: &Path) -> Ingestor {
        Ingestor::new(Arc::new(ChunkStore::new(dir)), ChunkingConfig::default())
    }

    #[test]
    fn assigns_new_id_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let ing = ingestor(dir.path());
        let meta = DocumentMetadata::new("t", "HR", "1", true, "x");
        let a = ing.ingest_text("one", meta.clone()).unwrap();
        let b = ing.ingest_text("two", meta).unwrap();
        assert_ne!(a.document_id, b.document_id);
        assert!(uuid::Uuid::parse_str(&a.document_id).is_ok());
    }

    #[test]
    fn keeps_caller_supplied_id() {
        let dir = tempfile::tempdir().unwrap();
        let ing = ingestor(dir.path());
        let mut meta = DocumentMetadata::new("t", "HR", "1", true, "x");
        meta.document_id = Some("handbook".into());
        let report = ing.ingest_text("one two three", meta).unwrap();
        assert_eq!(report.document_id, "handbook");
        assert_eq!(report.text_length, 13);
    }

    #[test]
    fn unapproved_document_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ing = ingestor(dir.path());
        let meta = DocumentMetadata::new("t", "HR", "1", false, "x");
        let err = ing.ingest_text("secret", meta).unwrap_err();
        assert!(matches!(err, AttestError::Governance(_)));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn bad_chunking_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        let ing = Ingestor::new(
            Arc::new(ChunkStore::new(&chunks)),
            ChunkingConfig {
                chunk_size: 10,
                overlap: 10,
            },
        );
        let meta = DocumentMetadata::new("t", "HR", "1", true, "x");
        let err = ing.ingest_text("a b c", meta).unwrap_err();
        assert!(matches!(err, AttestError::InvalidParameter(_)));
        assert!(!chunks.exists());
    }

    #[test]
    fn file_types_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let ing = ingestor(&dir.path().join("chunks"));
        let meta = DocumentMetadata::new("t", "Eng", "1", true, "x");

        let md = dir.path().join("guide.md");
        std::fs::write(&md, "# Guide\nuse the linter").unwrap();
        assert_eq!(ing.ingest_file(&md, meta.clone()).unwrap().chunk_count, 1);

        let pdf = dir.path().join("guide.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let err = ing.ingest_file(&pdf, meta).unwrap_err();
        assert!(matches!(err, AttestError::Config(msg) if msg.contains("unsupported")));
    }
}
