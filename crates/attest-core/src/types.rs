use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AttestError;

/// Approval record attached to a document and copied onto each of its chunks.
///
/// The copy is taken at ingestion time; changing a document's approval
/// requires re-ingesting it.
///
/// # Examples
///
/// ```
/// use attest_core::DocumentMetadata;
///
/// let meta = DocumentMetadata::new("Leave Policy", "HR", "1.0", true, "j.doe");
/// assert!(meta.approved);
/// assert!(meta.document_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Unique document identifier, assigned during ingestion when absent.
    #[serde(default)]
    pub document_id: Option<String>,
    /// Human-readable title.
    pub title: String,
    /// Topic label used to scope retrieval.
    pub document_type: String,
    /// Document version string.
    pub version: String,
    /// Whether the document passed review.
    pub approved: bool,
    /// Who approved the document.
    #[serde(default)]
    pub approved_by: String,
    /// When the approval was granted.
    pub approval_date: DateTime<Utc>,
}

impl DocumentMetadata {
    /// Build metadata approved "now", without a document id.
    pub fn new(
        title: impl Into<String>,
        document_type: impl Into<String>,
        version: impl Into<String>,
        approved: bool,
        approved_by: impl Into<String>,
    ) -> Self {
        Self {
            document_id: None,
            title: title.into(),
            document_type: document_type.into(),
            version: version.into(),
            approved,
            approved_by: approved_by.into(),
            approval_date: Utc::now(),
        }
    }
}

/// A bounded text fragment of a document, the unit of retrieval.
///
/// # Examples
///
/// ```
/// use attest_core::{Chunk, DocumentMetadata};
///
/// let meta = DocumentMetadata::new("Handbook", "HR", "2", true, "ops");
/// let chunk = Chunk::new("doc1", 3, "some words", meta);
/// assert_eq!(chunk.chunk_id, "doc1_chunk_3");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}_chunk_{ordinal}`.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// Parent document metadata at ingestion time.
    pub metadata: DocumentMetadata,
}

impl Chunk {
    /// Create a chunk whose id is derived from the document id and ordinal.
    pub fn new(
        document_id: &str,
        ordinal: usize,
        text: impl Into<String>,
        metadata: DocumentMetadata,
    ) -> Self {
        Self {
            chunk_id: chunk_id(document_id, ordinal),
            text: text.into(),
            metadata,
        }
    }

    /// Topic label of the parent document.
    pub fn document_type(&self) -> &str {
        &self.metadata.document_type
    }
}

/// Derive the id of the `ordinal`-th chunk of a document.
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{document_id}_chunk_{ordinal}")
}

/// Reject anything that is not a plain file stem: no separators, no leading
/// dot, not empty. `kind` names the value in the error message.
///
/// # Errors
///
/// Returns [`AttestError::InvalidParameter`] for unsafe names.
pub fn check_file_stem(kind: &str, name: &str) -> Result<(), AttestError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AttestError::InvalidParameter(format!(
            "{kind} '{name}' may only contain letters, digits, '-', '_' and '.'"
        )))
    }
}

/// A chunk paired with its squared L2 distance to a query.
///
/// Lower scores are more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The matched chunk.
    pub chunk: Chunk,
    /// Squared Euclidean distance to the query vector.
    pub score: f32,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use attest_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
