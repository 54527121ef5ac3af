//! Query-time retrieval: embed, over-fetch, filter by topic, trim.
//!
//! The index has no secondary structure for metadata, so topic scoping happens
//! after the nearest-neighbour scan. When a topic is requested the pipeline
//! fetches `topic_overfetch * k` neighbours and keeps the first `k` that match.
//! Fewer than `k` survivors is a normal, successful result.

use std::collections::BTreeSet;
use std::sync::Arc;

use attest_core::{AttestError, ScoredChunk};
use tracing::{debug, info};

use crate::embedding::EmbeddingGateway;
use crate::registry::IndexRegistry;

const DEFAULT_TOPIC_OVERFETCH: usize = 3;

/// Retrieval pipeline over named indexes.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use attest_retrieval::embedding::{EmbeddingClient, EmbeddingGateway};
/// use attest_retrieval::registry::IndexRegistry;
/// use attest_retrieval::retriever::Retriever;
/// use attest_retrieval::store::IndexStore;
///
/// # async fn example() {
/// let gateway = Arc::new(EmbeddingGateway::new(Arc::new(EmbeddingClient::new("key")), 16));
/// let registry = Arc::new(IndexRegistry::new(IndexStore::new("data/vector_index")));
/// let retriever = Retriever::new(gateway, registry);
/// let hits = retriever
///     .retrieve("default", "parental leave", 5, Some("HR"))
///     .await
///     .unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct Retriever {
    gateway: Arc<EmbeddingGateway>,
    registry: Arc<IndexRegistry>,
    topic_overfetch: usize,
}

impl Retriever {
    /// Create a retriever with the default 3x topic over-fetch.
    pub fn new(gateway: Arc<EmbeddingGateway>, registry: Arc<IndexRegistry>) -> Self {
        Self {
            gateway,
            registry,
            topic_overfetch: DEFAULT_TOPIC_OVERFETCH,
        }
    }

    /// Override the topic over-fetch multiplier (minimum 1).
    pub fn with_topic_overfetch(mut self, multiplier: usize) -> Self {
        self.topic_overfetch = multiplier.max(1);
        self
    }

    /// The registry queried by this retriever.
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Return up to `k` chunks nearest to `query` from `store_name`, nearest
    /// first, optionally restricted to chunks whose `document_type == topic`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::IndexNotFound`] if `store_name` was never built
    /// or saved, [`AttestError::EmbeddingService`] if the query cannot be
    /// embedded, and [`AttestError::DimensionMismatch`] if the query
    /// embedding does not fit the index.
    pub async fn retrieve(
        &self,
        store_name: &str,
        query: &str,
        k: usize,
        topic: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, AttestError> {
        info!(
            store = store_name,
            k,
            topic = topic.unwrap_or("-"),
            "retrieving context for '{}'",
            preview(query)
        );

        let index = self.registry.get_or_load(store_name)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.gateway.embed_query(query).await?;

        let results = match topic {
            Some(topic) => {
                let fetch = k.saturating_mul(self.topic_overfetch);
                let candidates = index.search(&query_embedding, fetch)?;
                let mut filtered = filter_by_document_type(candidates, topic);
                filtered.truncate(k);
                filtered
            }
            None => index.search(&query_embedding, k)?,
        };

        let documents: BTreeSet<&str> = results
            .iter()
            .map(|r| r.chunk.metadata.document_id.as_deref().unwrap_or("unknown"))
            .collect();
        info!(
            "retrieved {} contexts from {} documents",
            results.len(),
            documents.len()
        );
        debug!(documents = ?documents, "context sources");

        Ok(results)
    }
}

/// Keep only results whose `document_type` equals `document_type`, in order.
///
/// Applying the same filter twice gives the same result as applying it once.
///
/// # Examples
///
/// ```
/// use attest_retrieval::retriever::filter_by_document_type;
///
/// assert!(filter_by_document_type(Vec::new(), "HR").is_empty());
/// ```
pub fn filter_by_document_type(results: Vec<ScoredChunk>, document_type: &str) -> Vec<ScoredChunk> {
    let before = results.len();
    let filtered: Vec<ScoredChunk> = results
        .into_iter()
        .filter(|r| r.chunk.document_type() == document_type)
        .collect();
    debug!(
        "filtered {before} chunks to {} of type '{document_type}'",
        filtered.len()
    );
    filtered
}

fn preview(text: &str) -> String {
    let mut head: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        head.push_str("...");
    }
    head
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use attest_core::{Chunk, DocumentMetadata};

    use super::*;
    use crate::embedding::Embedder;
    use crate::index::VectorIndex;
    use crate::store::IndexStore;

    /// Every text embeds to the origin.
    struct Origin;

    #[async_trait]
    impl Embedder for Origin {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttestError> {
            Ok(texts.iter().map(|_| vec![0.0, 0.0]).collect())
        }
    }

    fn scored(id: &str, topic: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                chunk_id: id.into(),
                text: id.into(),
                metadata: DocumentMetadata::new("t", topic, "1", true, "x"),
            },
            score,
        }
    }

    fn retriever_with(topics: &[&str]) -> (tempfile::TempDir, Retriever) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(IndexRegistry::new(IndexStore::new(dir.path())));
        let mut index = VectorIndex::empty();
        let vectors = (0..topics.len()).map(|i| vec![i as f32 + 1.0, 0.0]).collect();
        let chunks = topics
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Chunk::new(
                    &format!("doc{i}"),
                    0,
                    format!("c{i}"),
                    DocumentMetadata::new("t", *t, "1", true, "x"),
                )
            })
            .collect();
        index.add(vectors, chunks).unwrap();
        registry.install("default", index);

        let gateway = Arc::new(EmbeddingGateway::new(Arc::new(Origin), 16));
        (dir, Retriever::new(gateway, registry))
    }

    #[test]
    fn filter_preserves_order_and_is_idempotent() {
        let results = vec![
            scored("a", "HR", 0.1),
            scored("b", "Eng", 0.2),
            scored("c", "HR", 0.3),
        ];
        let once = filter_by_document_type(results, "HR");
        let twice = filter_by_document_type(once.clone(), "HR");
        assert_eq!(once, twice);
        let ids: Vec<&str> = once.iter().map(|r| r.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn without_topic_fetches_exactly_k() {
        let (_dir, retriever) = retriever_with(&["HR", "Eng", "HR", "Eng"]);
        let hits = retriever.retrieve("default", "q", 3, None).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["c0", "c1", "c2"]);
    }

    #[tokio::test]
    async fn topic_results_are_trimmed_to_k() {
        let (_dir, retriever) = retriever_with(&["HR", "HR", "HR", "HR", "Eng"]);
        let hits = retriever.retrieve("default", "q", 2, Some("HR")).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.document_type() == "HR"));
    }

    #[tokio::test]
    async fn sparse_topic_returns_fewer_than_k() {
        // the single HR chunk sits beyond the 3 * k = 3 over-fetch window
        let (_dir, retriever) = retriever_with(&["Eng", "Eng", "Eng", "HR"]);
        let hits = retriever.retrieve("default", "q", 1, Some("HR")).await.unwrap();
        assert!(hits.is_empty());

        let wider = retriever.clone().with_topic_overfetch(4);
        let hits = wider.retrieve("default", "q", 1, Some("HR")).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn unbuilt_store_is_index_not_found() {
        let (_dir, retriever) = retriever_with(&["HR"]);
        let err = retriever.retrieve("missing", "q", 1, None).await.unwrap_err();
        assert!(matches!(err, AttestError::IndexNotFound(_)));
    }

    #[tokio::test]
    async fn zero_k_is_empty_but_still_checks_the_store() {
        let (_dir, retriever) = retriever_with(&["HR"]);
        assert!(retriever.retrieve("default", "q", 0, None).await.unwrap().is_empty());
        assert!(retriever.retrieve("missing", "q", 0, None).await.is_err());
    }
}
