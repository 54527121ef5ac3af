//! Integration test: ingest → build → retrieve against a keyword embedder.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use attest_core::{AttestError, ChunkingConfig, DocumentMetadata};
use attest_retrieval::builder::IndexBuilder;
use attest_retrieval::chunk_store::ChunkStore;
use attest_retrieval::embedding::{Embedder, EmbeddingGateway};
use attest_retrieval::ingest::Ingestor;
use attest_retrieval::registry::IndexRegistry;
use attest_retrieval::retriever::{filter_by_document_type, Retriever};
use attest_retrieval::store::IndexStore;

/// Looks up each text in a fixed table; unknown texts embed to the origin.
struct TableEmbedder(HashMap<&'static str, Vec<f32>>);

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttestError> {
        Ok(texts
            .iter()
            .map(|t| self.0.get(t.as_str()).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
            .collect())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    ingestor: Ingestor,
    builder: IndexBuilder,
    retriever: Retriever,
    registry: Arc<IndexRegistry>,
}

fn harness(table: &[(&'static str, [f32; 2])]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let chunks = Arc::new(ChunkStore::new(dir.path().join("chunks")));
    let registry = Arc::new(IndexRegistry::new(IndexStore::new(
        dir.path().join("vector_index"),
    )));
    let embedder = TableEmbedder(table.iter().map(|(k, v)| (*k, v.to_vec())).collect());
    let gateway = Arc::new(EmbeddingGateway::new(Arc::new(embedder), 16));

    Harness {
        ingestor: Ingestor::new(Arc::clone(&chunks), ChunkingConfig::default()),
        builder: IndexBuilder::new(chunks, Arc::clone(&gateway), Arc::clone(&registry))
            .with_dimension(2),
        retriever: Retriever::new(gateway, Arc::clone(&registry)),
        registry,
        _dir: dir,
    }
}

fn doc(id: &str, topic: &str, approved: bool) -> DocumentMetadata {
    let mut meta = DocumentMetadata::new(id, topic, "1.0", approved, "reviewer");
    meta.document_id = Some(id.to_string());
    meta
}

#[tokio::test]
async fn topic_filter_skips_closer_off_topic_chunk() {
    // distance to the query: beta < alpha < gamma
    let h = harness(&[
        ("alpha", [2.0, 0.0]),
        ("beta", [1.0, 0.0]),
        ("gamma", [3.0, 0.0]),
    ]);
    h.ingestor.ingest_text("alpha", doc("a", "HR", true)).unwrap();
    h.ingestor.ingest_text("beta", doc("b", "Eng", true)).unwrap();
    h.ingestor.ingest_text("gamma", doc("c", "HR", true)).unwrap();
    h.builder.build("default", true, None).await.unwrap();

    let unscoped = h.retriever.retrieve("default", "query", 3, None).await.unwrap();
    let order: Vec<&str> = unscoped.iter().map(|r| r.chunk.text.as_str()).collect();
    assert_eq!(order, vec!["beta", "alpha", "gamma"]);

    let hr = h.retriever.retrieve("default", "query", 1, Some("HR")).await.unwrap();
    assert_eq!(hr.len(), 1);
    assert_eq!(hr[0].chunk.metadata.document_id.as_deref(), Some("a"));

    // filtering an already-filtered list changes nothing
    assert_eq!(filter_by_document_type(hr.clone(), "HR"), hr);
}

#[tokio::test]
async fn unapproved_documents_never_reach_results() {
    let h = harness(&[("public", [1.0, 0.0]), ("draft", [0.0, 0.0])]);
    h.ingestor.ingest_text("public", doc("pub", "HR", true)).unwrap();
    // the ingestor refuses drafts outright
    assert!(h.ingestor.ingest_text("draft", doc("draft", "HR", false)).is_err());

    h.builder.build("default", true, None).await.unwrap();
    let hits = h.retriever.retrieve("default", "draft", 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|r| r.chunk.metadata.approved));
}

#[tokio::test]
async fn built_index_reports_lockstep_stats_and_reloads() {
    let h = harness(&[("one", [1.0, 1.0]), ("two", [2.0, 2.0])]);
    h.ingestor.ingest_text("one", doc("d1", "Policy", true)).unwrap();
    h.ingestor.ingest_text("two", doc("d2", "Policy", true)).unwrap();

    let stats = h.builder.build("policies", true, None).await.unwrap();
    assert_eq!(stats.total_vectors, 2);
    assert_eq!(stats.total_vectors, stats.total_chunks);
    assert_eq!(stats.dimension, 2);

    h.registry.evict("policies");
    let reloaded = h.registry.get_or_load("policies").unwrap();
    assert_eq!(reloaded.stats(), stats);
}

#[tokio::test]
async fn searching_an_unbuilt_store_is_index_not_found() {
    let h = harness(&[]);
    let err = h
        .retriever
        .retrieve("never-built", "anything", 3, None)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, AttestError::IndexNotFound(name) if name == "never-built"),
        "unexpected error: {err}"
    );
}
