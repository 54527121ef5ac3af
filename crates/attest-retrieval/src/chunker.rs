//! Overlapping word-window chunking.
//!
//! Text is split on whitespace and cut into windows of `chunk_size` words,
//! each starting `chunk_size - overlap` words after the previous one. The
//! final window may be shorter; no window is produced once the previous one
//! already reached the last word.

use attest_core::{AttestError, ChunkingConfig};

/// Split `text` into overlapping windows of whole words.
///
/// # Errors
///
/// Returns [`AttestError::InvalidParameter`] if `chunk_size` is zero or
/// `overlap >= chunk_size` (the window would never advance).
///
/// # Examples
///
/// ```
/// use attest_retrieval::chunker::chunk_text;
///
/// let chunks = chunk_text("a b c d e f g", 3, 1).unwrap();
/// assert_eq!(chunks, vec!["a b c", "c d e", "e f g"]);
///
/// assert!(chunk_text("", 500, 100).unwrap().is_empty());
/// assert!(chunk_text("a b", 2, 2).is_err());
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, AttestError> {
    let config = ChunkingConfig {
        chunk_size,
        overlap,
    };
    chunk_with(text, &config)
}

/// Same as [`chunk_text`], taking the parameters from a [`ChunkingConfig`].
///
/// # Errors
///
/// Returns [`AttestError::InvalidParameter`] if the config is invalid.
pub fn chunk_with(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, AttestError> {
    config.validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    Ok(windows(words.len(), config)
        .map(|(start, end)| words[start..end].join(" "))
        .collect())
}

/// Word offsets `[start, end)` of each window over `word_count` words.
///
/// `config` must already be validated.
fn windows(word_count: usize, config: &ChunkingConfig) -> impl Iterator<Item = (usize, usize)> {
    let chunk_size = config.chunk_size;
    let step = chunk_size - config.overlap;
    let mut start = 0;
    let mut done = word_count == 0;

    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let end = (start + chunk_size).min(word_count);
        let window = (start, end);
        if end == word_count {
            done = true;
        } else {
            start += step;
        }
        Some(window)
    })
}
