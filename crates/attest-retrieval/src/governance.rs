//! Approval gate for documents entering the corpus.

use attest_core::{AttestError, Chunk, DocumentMetadata};

/// Accept a document only if it is approved and names its approver.
///
/// Called once per document before its chunks are persisted.
///
/// # Errors
///
/// Returns [`AttestError::Governance`] if `approved` is false or
/// `approved_by` is blank.
///
/// # Examples
///
/// ```
/// use attest_core::DocumentMetadata;
/// use attest_retrieval::governance::validate_document;
///
/// let ok = DocumentMetadata::new("Policy", "HR", "1", true, "cfo");
/// assert!(validate_document(&ok).is_ok());
///
/// let unsigned = DocumentMetadata::new("Policy", "HR", "1", true, "  ");
/// assert!(validate_document(&unsigned).is_err());
/// ```
pub fn validate_document(metadata: &DocumentMetadata) -> Result<(), AttestError> {
    if !metadata.approved {
        return Err(AttestError::Governance(format!(
            "document '{}' is not approved for ingestion",
            metadata.title
        )));
    }
    if metadata.approved_by.trim().is_empty() {
        return Err(AttestError::Governance(format!(
            "document '{}' has no approved_by",
            metadata.title
        )));
    }
    Ok(())
}

/// Per-chunk re-check applied when building an index from storage.
pub fn is_indexable(chunk: &Chunk) -> bool {
    chunk.metadata.approved
}
