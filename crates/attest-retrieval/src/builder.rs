//! Full index rebuild from the chunk store.

use std::sync::Arc;

use attest_core::{AttestError, Chunk};
use tracing::{info, warn};

use crate::chunk_store::ChunkStore;
use crate::embedding::EmbeddingGateway;
use crate::index::{IndexStats, VectorIndex};
use crate::registry::IndexRegistry;

/// Rebuilds a named index from every stored chunk that passes governance.
///
/// The new index is written next to the old artifact, renamed over it, and
/// only then installed in the registry. Searches running during a build keep
/// the snapshot they started with.
pub struct IndexBuilder {
    chunks: Arc<ChunkStore>,
    gateway: Arc<EmbeddingGateway>,
    registry: Arc<IndexRegistry>,
    expected_dimension: Option<usize>,
}

impl IndexBuilder {
    /// A builder reading `chunks` and installing into `registry`.
    pub fn new(
        chunks: Arc<ChunkStore>,
        gateway: Arc<EmbeddingGateway>,
        registry: Arc<IndexRegistry>,
    ) -> Self {
        Self {
            chunks,
            gateway,
            registry,
            expected_dimension: None,
        }
    }

    /// Require every embedding to have `dimension` components.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    /// Rebuild `store_name`.
    ///
    /// With `approved_only`, chunks of unapproved documents are skipped. A
    /// `document_type` restricts the index to one topic. An empty selection
    /// replaces the store with an empty index, so chunks that lost approval
    /// stop being retrievable.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::EmbeddingService`] if embedding fails,
    /// [`AttestError::DimensionMismatch`] if a vector has the wrong size, and
    /// [`AttestError::Storage`] if the artifact cannot be written. On error
    /// the previously installed index is unchanged.
    pub async fn build(
        &self,
        store_name: &str,
        approved_only: bool,
        document_type: Option<&str>,
    ) -> Result<IndexStats, AttestError> {
        let chunks = self.chunks.load_all_chunks(approved_only, document_type)?;
        let vectors = if chunks.is_empty() {
            warn!(store = store_name, "no chunks to index, installing an empty index");
            Vec::new()
        } else {
            info!(store = store_name, chunks = chunks.len(), "embedding chunks");
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            self.gateway.embed(&texts).await?
        };

        let index = assemble(self.expected_dimension, vectors, chunks)?;
        let stats = index.stats();

        self.registry.store().save(store_name, &index)?;
        self.registry.install(store_name, index);

        info!(
            store = store_name,
            vectors = stats.total_vectors,
            dimension = stats.dimension,
            "index built"
        );
        Ok(stats)
    }
}

fn assemble(
    dimension: Option<usize>,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<Chunk>,
) -> Result<VectorIndex, AttestError> {
    let mut index = match dimension {
        Some(d) => VectorIndex::new(d),
        None => VectorIndex::empty(),
    };
    index.add(vectors, chunks)?;
    Ok(index)
}
