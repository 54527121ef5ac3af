//! Brute-force vector index over chunk embeddings.
//!
//! Each position holds one [`IndexEntry`] pairing a vector with its chunk, so
//! vectors and chunks cannot drift apart. Similarity is raw squared Euclidean
//! distance in `f32`; no normalisation is applied.

use attest_core::{AttestError, Chunk, ScoredChunk};
use serde::{Deserialize, Serialize};

use crate::store::IndexStore;

/// One stored embedding together with the chunk it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Embedding of `chunk.text`.
    pub vector: Vec<f32>,
    /// The chunk payload returned by searches.
    pub chunk: Chunk,
}

/// Index statistics.
///
/// # Examples
///
/// ```
/// use attest_retrieval::index::VectorIndex;
///
/// let stats = VectorIndex::new(3).stats();
/// assert_eq!(stats.dimension, 3);
/// assert_eq!(stats.total_vectors, stats.total_chunks);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of stored vectors.
    pub total_vectors: usize,
    /// Vector dimension (0 until the first add on an unsized index).
    pub dimension: usize,
    /// Number of stored chunks.
    pub total_chunks: usize,
}

/// In-memory exhaustive-scan index.
///
/// # Examples
///
/// ```
/// use attest_core::{Chunk, DocumentMetadata};
/// use attest_retrieval::index::VectorIndex;
///
/// let meta = DocumentMetadata::new("t", "HR", "1", true, "a");
/// let mut index = VectorIndex::empty();
/// index
///     .add(
///         vec![vec![0.0, 0.0], vec![5.0, 5.0]],
///         vec![Chunk::new("d", 0, "near", meta.clone()), Chunk::new("d", 1, "far", meta)],
///     )
///     .unwrap();
///
/// let hits = index.search(&[1.0, 0.0], 1).unwrap();
/// assert_eq!(hits[0].chunk.text, "near");
/// assert_eq!(hits[0].score, 1.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Create an index with a fixed dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            entries: Vec::new(),
        }
    }

    /// Create an index whose dimension is taken from the first add.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rebuild an index from persisted entries, re-checking every dimension.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::DimensionMismatch`] if any entry disagrees with
    /// `dimension`.
    pub fn from_entries(dimension: usize, entries: Vec<IndexEntry>) -> Result<Self, AttestError> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(AttestError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }
        Ok(Self {
            dimension: Some(dimension),
            entries,
        })
    }

    /// The vector dimension, if fixed.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append `vectors[i]` paired with `chunks[i]` for every `i`.
    ///
    /// All inputs are validated before anything is appended, so a failed add
    /// leaves the index unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::InvalidParameter`] if the lengths differ or a
    /// vector is empty, and [`AttestError::DimensionMismatch`] if any vector's
    /// length differs from the index dimension.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>) -> Result<(), AttestError> {
        if vectors.len() != chunks.len() {
            return Err(AttestError::InvalidParameter(format!(
                "{} vectors supplied for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        let dimension = self.dimension.unwrap_or(first.len());
        if dimension == 0 {
            return Err(AttestError::InvalidParameter(
                "embedding vectors must not be empty".into(),
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(AttestError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.dimension = Some(dimension);
        self.entries.reserve(vectors.len());
        self.entries.extend(
            vectors
                .into_iter()
                .zip(chunks)
                .map(|(vector, chunk)| IndexEntry { vector, chunk }),
        );
        Ok(())
    }

    /// Return the `k` entries closest to `query`, nearest first.
    ///
    /// Ties keep insertion order. Asking for more than [`len`](Self::len)
    /// returns everything.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::DimensionMismatch`] if the query length differs
    /// from the index dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, AttestError> {
        if let Some(dimension) = self.dimension {
            if query.len() != dimension {
                return Err(AttestError::DimensionMismatch {
                    expected: dimension,
                    actual: query.len(),
                });
            }
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, squared_l2(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Counts and dimension.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_vectors: self.entries.len(),
            dimension: self.dimension.unwrap_or(0),
            total_chunks: self.entries.len(),
        }
    }

    /// Persist under `name` in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Storage`] on write failure.
    pub fn save(&self, store: &IndexStore, name: &str) -> Result<(), AttestError> {
        store.save(name, self)
    }

    /// Load `name` from `store`; `Ok(None)` if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Storage`] if the artifact exists but is unreadable.
    pub fn load(store: &IndexStore, name: &str) -> Result<Option<Self>, AttestError> {
        store.load(name)
    }
}

/// Squared Euclidean distance in single precision.
///
/// # Examples
///
/// ```
/// use attest_retrieval::index::squared_l2;
///
/// assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
/// ```
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use attest_core::DocumentMetadata;

    use super::*;

    fn chunk(id: &str, topic: &str) -> Chunk {
        Chunk {
            chunk_id: id.into(),
            text: format!("text of {id}"),
            metadata: DocumentMetadata::new("doc", topic, "1", true, "owner"),
        }
    }

    fn line_index(positions: &[f32]) -> VectorIndex {
        let mut index = VectorIndex::empty();
        let vectors = positions.iter().map(|p| vec![*p, 0.0]).collect();
        let chunks = (0..positions.len()).map(|i| chunk(&format!("c{i}"), "HR")).collect();
        index.add(vectors, chunks).unwrap();
        index
    }

    #[test]
    fn dimension_fixed_by_first_add() {
        let index = line_index(&[1.0, 2.0]);
        assert_eq!(index.dimension(), Some(2));
    }

    #[test]
    fn add_rejects_wrong_dimension_without_mutating() {
        let mut index = line_index(&[1.0]);
        let err = index
            .add(
                vec![vec![1.0, 1.0], vec![1.0, 1.0, 1.0]],
                vec![chunk("x", "HR"), chunk("y", "HR")],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AttestError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn add_rejects_length_mismatch() {
        let mut index = VectorIndex::new(2);
        let err = index
            .add(vec![vec![0.0, 0.0]], vec![chunk("a", "HR"), chunk("b", "HR")])
            .unwrap_err();
        assert!(matches!(err, AttestError::InvalidParameter(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn fixed_dimension_index_rejects_other_sizes() {
        let mut index = VectorIndex::new(4);
        assert!(index.add(vec![vec![0.0; 3]], vec![chunk("a", "HR")]).is_err());
        assert_eq!(index.stats().total_vectors, 0);
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = line_index(&[10.0, 1.0, 5.0, 3.0]);
        let hits = index.search(&[0.0, 0.0], 4).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3", "c2", "c0"]);
        assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn search_returns_exactly_k_when_available() {
        let index = line_index(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        for k in 0..=5 {
            assert_eq!(index.search(&[0.0, 0.0], k).unwrap().len(), k);
        }
    }

    #[test]
    fn search_with_k_above_len_returns_all() {
        let index = line_index(&[1.0, 2.0]);
        assert_eq!(index.search(&[0.0, 0.0], 50).unwrap().len(), 2);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = line_index(&[2.0, -2.0, 2.0]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn query_dimension_is_checked() {
        let index = line_index(&[1.0]);
        assert!(matches!(
            index.search(&[0.0, 0.0, 0.0], 1),
            Err(AttestError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn empty_index_search_is_empty() {
        let index = VectorIndex::empty();
        assert!(index.search(&[1.0, 2.0], 3).unwrap().is_empty());
    }

    #[test]
    fn stats_counts_stay_in_lockstep() {
        let mut index = VectorIndex::empty();
        for batch in 0..3 {
            let vectors = vec![vec![batch as f32, 1.0]; batch + 1];
            let chunks = (0..=batch).map(|i| chunk(&format!("b{batch}_{i}"), "Eng")).collect();
            index.add(vectors, chunks).unwrap();
            let stats = index.stats();
            assert_eq!(stats.total_vectors, stats.total_chunks);
        }
        assert_eq!(index.stats().total_chunks, 6);
        assert_eq!(index.entries()[5].chunk.chunk_id, "b2_2");
    }

    #[test]
    fn from_entries_rechecks_dimension() {
        let entries = vec![IndexEntry {
            vector: vec![1.0],
            chunk: chunk("a", "HR"),
        }];
        assert!(VectorIndex::from_entries(2, entries).is_err());
    }
}
