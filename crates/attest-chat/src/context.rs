//! Process-wide services, built once at start-up and passed to callers.

use std::sync::Arc;

use attest_core::{AttestConfig, AttestError};
use attest_retrieval::builder::IndexBuilder;
use attest_retrieval::chunk_store::ChunkStore;
use attest_retrieval::embedding::{Embedder, EmbeddingClient, EmbeddingGateway};
use attest_retrieval::ingest::Ingestor;
use attest_retrieval::registry::IndexRegistry;
use attest_retrieval::retriever::Retriever;
use attest_retrieval::store::IndexStore;
use tracing::info;

use crate::chatbot::ChatEngine;
use crate::llm::{Completer, LlmClient};
use crate::session::{JsonSessionStore, SessionManager, SessionStore};

/// Shared clients, stores and session state.
///
/// # Examples
///
/// ```no_run
/// use attest_core::AttestConfig;
/// use attest_chat::context::AppContext;
///
/// # async fn example() -> attest_core::Result<()> {
/// let ctx = AppContext::from_config(AttestConfig::default())?;
/// let reply = ctx.chat_engine().chat("s1", "What is the leave policy?", Some("HR")).await?;
/// println!("{}", reply.message);
/// ctx.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct AppContext {
    config: AttestConfig,
    chunks: Arc<ChunkStore>,
    gateway: Arc<EmbeddingGateway>,
    registry: Arc<IndexRegistry>,
    completer: Arc<dyn Completer>,
    sessions: Arc<SessionManager>,
}

impl AppContext {
    /// Build the production context: HTTP embedding and completion clients
    /// and on-disk stores under `storage.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Config`] for invalid settings or a missing
    /// embedding API key.
    pub fn from_config(config: AttestConfig) -> Result<Self, AttestError> {
        config.validate()?;
        let embedder = Arc::new(EmbeddingClient::with_config(&config.embedding)?);
        let completer = Arc::new(LlmClient::new(&config.llm)?);
        Self::with_components(config, embedder, completer)
    }

    /// Build a context around caller-supplied model clients.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::InvalidParameter`] or [`AttestError::Config`]
    /// for invalid settings.
    pub fn with_components(
        config: AttestConfig,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
    ) -> Result<Self, AttestError> {
        config.validate()?;
        let storage = &config.storage;
        let session_store: Arc<dyn SessionStore> =
            Arc::new(JsonSessionStore::new(storage.sessions_dir()));

        let ctx = Self {
            chunks: Arc::new(ChunkStore::new(storage.chunks_dir())),
            gateway: Arc::new(EmbeddingGateway::new(embedder, config.embedding.batch_size)),
            registry: Arc::new(IndexRegistry::new(IndexStore::new(storage.index_dir()))),
            completer,
            sessions: Arc::new(SessionManager::with_store(session_store)),
            config,
        };
        info!(data_dir = %ctx.config.storage.data_dir.display(), "application context ready");
        Ok(ctx)
    }

    /// The configuration this context was built from.
    pub fn config(&self) -> &AttestConfig {
        &self.config
    }

    /// Chunk records, the source of every index build.
    pub fn chunk_store(&self) -> &Arc<ChunkStore> {
        &self.chunks
    }

    /// Loaded index snapshots.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Live chat sessions.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// An ingestor using the configured chunking.
    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(Arc::clone(&self.chunks), self.config.chunking)
    }

    /// A builder that enforces the configured embedding dimension.
    pub fn index_builder(&self) -> IndexBuilder {
        IndexBuilder::new(
            Arc::clone(&self.chunks),
            Arc::clone(&self.gateway),
            Arc::clone(&self.registry),
        )
        .with_dimension(self.config.embedding.dimensions)
    }

    /// A retriever using the configured topic over-fetch.
    pub fn retriever(&self) -> Retriever {
        Retriever::new(Arc::clone(&self.gateway), Arc::clone(&self.registry))
            .with_topic_overfetch(self.config.retrieval.topic_overfetch)
    }

    /// A chat engine over the configured store.
    pub fn chat_engine(&self) -> ChatEngine {
        ChatEngine::new(
            self.retriever(),
            Arc::clone(&self.completer),
            Arc::clone(&self.sessions),
            Arc::clone(&self.chunks),
            self.config.retrieval.store_name.clone(),
            self.config.chat.clone(),
        )
    }

    /// Flush live sessions to disk.
    pub fn shutdown(&self) {
        let saved = self.sessions.save_all();
        info!(sessions = saved, "application context shut down");
    }
}
