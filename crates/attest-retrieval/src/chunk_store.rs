//! One JSON file of chunk records per document.
//!
//! This is the source of truth indexes are rebuilt from. The store accepts
//! chunks regardless of approval state; filtering happens on load.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use attest_core::{check_file_stem, AttestError, Chunk, DocumentMetadata};
use tracing::{debug, info, warn};

use crate::governance;

/// Directory of `{document_id}.json` chunk files.
///
/// # Examples
///
/// ```
/// use attest_core::DocumentMetadata;
/// use attest_retrieval::chunk_store::ChunkStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = ChunkStore::new(dir.path());
/// let meta = DocumentMetadata::new("Guide", "Eng", "1", true, "lead");
/// let saved = store
///     .save_chunks("doc-1", &["alpha".to_string(), "beta".to_string()], &meta)
///     .unwrap();
/// assert_eq!(saved, 2);
/// assert_eq!(store.load_all_chunks(true, None).unwrap().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    /// Use `dir` for chunk files. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `texts` as chunks `0..n` of `document_id`, overwriting any
    /// previous chunks of that document. Returns the number saved.
    ///
    /// The stored metadata always carries `document_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::InvalidParameter`] for an unsafe document id and
    /// [`AttestError::Io`] on write failure.
    pub fn save_chunks(
        &self,
        document_id: &str,
        texts: &[String],
        metadata: &DocumentMetadata,
    ) -> Result<usize, AttestError> {
        let path = self.path_for(document_id)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut metadata = metadata.clone();
        metadata.document_id = Some(document_id.to_string());

        let records: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk::new(document_id, i, text.as_str(), metadata.clone()))
            .collect();

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(&records)?)?;
        std::fs::rename(&tmp_path, &path)?;

        debug!(document_id, chunks = records.len(), "saved chunks");
        Ok(records.len())
    }

    /// Chunks of one document, or `None` if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Io`] or [`AttestError::Serialization`] if the
    /// file exists but cannot be read.
    pub fn load_document(&self, document_id: &str) -> Result<Option<Vec<Chunk>>, AttestError> {
        let path = self.path_for(document_id)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_chunk_file(&path)?))
    }

    /// Every stored chunk, optionally limited to approved documents and one
    /// topic. Files are read in name order so builds are reproducible.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Io`] or [`AttestError::Serialization`] on an
    /// unreadable chunk file.
    pub fn load_all_chunks(
        &self,
        approved_only: bool,
        document_type: Option<&str>,
    ) -> Result<Vec<Chunk>, AttestError> {
        let mut all_chunks = Vec::new();
        let mut skipped = 0usize;

        for path in self.chunk_files()? {
            for chunk in read_chunk_file(&path)? {
                if approved_only && !governance::is_indexable(&chunk) {
                    skipped += 1;
                    warn!(
                        document_id = chunk.metadata.document_id.as_deref().unwrap_or("unknown"),
                        chunk_id = %chunk.chunk_id,
                        "skipping unapproved chunk"
                    );
                    continue;
                }
                if document_type.is_some_and(|t| chunk.document_type() != t) {
                    continue;
                }
                all_chunks.push(chunk);
            }
        }

        if skipped > 0 {
            info!("skipped {skipped} chunks from unapproved documents");
        }
        info!("loaded {} chunks", all_chunks.len());
        Ok(all_chunks)
    }

    /// Sorted, distinct topics of approved chunks.
    ///
    /// # Errors
    ///
    /// Same as [`load_all_chunks`](Self::load_all_chunks).
    pub fn available_topics(&self) -> Result<Vec<String>, AttestError> {
        let mut topics = BTreeSet::new();
        for path in self.chunk_files()? {
            for chunk in read_chunk_file(&path)? {
                if chunk.metadata.approved && !chunk.metadata.document_type.is_empty() {
                    topics.insert(chunk.metadata.document_type);
                }
            }
        }
        Ok(topics.into_iter().collect())
    }

    /// Ids of all stored documents, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Io`] if the directory cannot be read.
    pub fn document_ids(&self) -> Result<Vec<String>, AttestError> {
        Ok(self
            .chunk_files()?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    fn path_for(&self, document_id: &str) -> Result<PathBuf, AttestError> {
        check_file_stem("document id", document_id)?;
        Ok(self.dir.join(format!("{document_id}.json")))
    }

    fn chunk_files(&self) -> Result<Vec<PathBuf>, AttestError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_chunk_file(path: &Path) -> Result<Vec<Chunk>, AttestError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
