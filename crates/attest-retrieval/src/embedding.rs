//! Embedding service boundary.
//!
//! [`Embedder`] is a single round-trip to an embedding provider.
//! [`EmbeddingGateway`] sits in front of it and handles input sanitising,
//! bounded batching and cardinality checks, so callers get exactly one vector
//! per input text, in input order, or an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use attest_core::{AttestError, EmbeddingConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const EMPTY_PLACEHOLDER: &str = "empty";
const LOG_PREVIEW_CHARS: usize = 100;

/// One request to an embedding provider.
///
/// Implementations must return one vector per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single batch of already-sanitised texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttestError>;
}

/// OpenAI-compatible `/embeddings` client.
///
/// # Examples
///
/// ```
/// use attest_retrieval::embedding::EmbeddingClient;
///
/// let client = EmbeddingClient::new("test-key");
/// assert_eq!(client.model(), "text-embedding-3-small");
/// ```
pub struct EmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl EmbeddingClient {
    /// Create a client for the default endpoint and model.
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: EmbeddingConfig::default().model,
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the `OPENAI_API_KEY` env var if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Config`] if no API key is available or the
    /// HTTP client cannot be built.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, AttestError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                AttestError::Config(
                    "embedding API key not found: set embedding.api_key in .attest.toml or OPENAI_API_KEY env var".into(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AttestError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
        })
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, texts: &[String]) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttestError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("api-key", &self.api_key)
            .json(&self.build_request(texts))
            .send()
            .await
            .map_err(|e| AttestError::EmbeddingService(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(AttestError::EmbeddingService(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let embed_response: EmbedResponse = response.json().await.map_err(|e| {
            AttestError::EmbeddingService(format!("failed to parse response: {e}"))
        })?;

        Ok(into_ordered_vectors(embed_response))
    }
}

/// Providers may return items out of order; honour `index` when present.
fn into_ordered_vectors(response: EmbedResponse) -> Vec<Vec<f32>> {
    let mut items = response.data;
    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
    }
    items.into_iter().map(|item| item.embedding).collect()
}

/// Trim, strip NUL bytes, and replace empty input with a placeholder.
///
/// Empty text is never dropped, so the output stays aligned with the
/// caller's chunk list.
///
/// # Examples
///
/// ```
/// use attest_retrieval::embedding::sanitize_input;
///
/// assert_eq!(sanitize_input("  hi \0"), "hi");
/// assert_eq!(sanitize_input("   "), "empty");
/// ```
pub fn sanitize_input(text: &str) -> String {
    let cleaned: String = text.trim().chars().filter(|c| *c != '\0').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Batching front end for an [`Embedder`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use attest_retrieval::embedding::{EmbeddingClient, EmbeddingGateway};
///
/// let gateway = EmbeddingGateway::new(Arc::new(EmbeddingClient::new("key")), 16);
/// assert_eq!(gateway.batch_size(), 16);
/// ```
#[derive(Clone)]
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingGateway {
    /// Wrap `embedder`, sending at most `batch_size` texts per request.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Texts sent per request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed `texts`, returning exactly one vector per input, in order.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::EmbeddingService`] if any batch fails or comes
    /// back with the wrong number of vectors. No partial result is returned.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let clean: Vec<String> = texts.iter().map(|t| sanitize_input(t)).collect();
        let mut all_embeddings = Vec::with_capacity(clean.len());

        for (i, batch) in clean.chunks(self.batch_size).enumerate() {
            debug!(batch = i, size = batch.len(), "embedding batch");

            let vectors = self.embedder.embed_batch(batch).await.map_err(|e| {
                error!(batch = i, contents = %preview(batch), "error embedding batch: {e}");
                match e {
                    AttestError::EmbeddingService(_) => e,
                    other => AttestError::EmbeddingService(other.to_string()),
                }
            })?;

            if vectors.len() != batch.len() {
                error!(batch = i, contents = %preview(batch), "embedding cardinality mismatch");
                return Err(AttestError::EmbeddingService(format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }
            all_embeddings.extend(vectors);
        }

        Ok(all_embeddings)
    }

    /// Embed a single query as a one-item batch.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::EmbeddingService`] if the provider call fails.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, AttestError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AttestError::EmbeddingService("empty response for query".into()))
    }
}

fn preview(batch: &[String]) -> String {
    let joined = format!("{batch:?}");
    if joined.chars().count() <= LOG_PREVIEW_CHARS {
        joined
    } else {
        let head: String = joined.chars().take(LOG_PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}
