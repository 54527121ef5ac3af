use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AttestError;

/// Top-level configuration loaded from `.attest.toml`.
///
/// Every section is optional; missing keys fall back to their defaults.
///
/// # Examples
///
/// ```
/// use attest_core::AttestConfig;
///
/// let config = AttestConfig::default();
/// assert_eq!(config.chunking.chunk_size, 500);
/// assert_eq!(config.retrieval.store_name, "default");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttestConfig {
    /// Completion provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Word-window chunking settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval defaults.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// On-disk locations.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chat behavior.
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AttestConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Io`] if the file cannot be read, or
    /// [`AttestError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use attest_core::AttestConfig;
    /// use std::path::Path;
    ///
    /// let config = AttestConfig::from_file(Path::new(".attest.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, AttestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_core::AttestConfig;
    ///
    /// let toml = r#"
    /// [chunking]
    /// chunk_size = 200
    /// overlap = 20
    /// "#;
    /// let config = AttestConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.chunking.chunk_size, 200);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, AttestError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject values that would make chunking or batching impossible.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::InvalidParameter`] naming the offending key.
    pub fn validate(&self) -> Result<(), AttestError> {
        self.chunking.validate()?;
        if self.embedding.batch_size == 0 {
            return Err(AttestError::InvalidParameter(
                "embedding.batch_size must be at least 1".into(),
            ));
        }
        if self.retrieval.topic_overfetch == 0 {
            return Err(AttestError::InvalidParameter(
                "retrieval.topic_overfetch must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Chat completion provider configuration.
///
/// # Examples
///
/// ```
/// use attest_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!(config.max_tokens, 800);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model (or deployment) identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key; falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens in the answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    800
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Configuration for the embedding service.
///
/// # Examples
///
/// ```
/// use attest_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.model, "text-embedding-3-small");
/// assert_eq!(config.dimensions, 1536);
/// assert_eq!(config.batch_size, 16);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// API key; falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// Model (or deployment) name.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Expected embedding dimension.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Texts per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    16
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

/// Word-window chunking parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Words per chunk (default: 500).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared by consecutive chunks (default: 100).
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    500
}

fn default_overlap() -> usize {
    100
}

impl ChunkingConfig {
    /// Check `0 < chunk_size` and `overlap < chunk_size`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::InvalidParameter`] otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_core::ChunkingConfig;
    ///
    /// let bad = ChunkingConfig { chunk_size: 10, overlap: 10 };
    /// assert!(bad.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), AttestError> {
        if self.chunk_size == 0 {
            return Err(AttestError::InvalidParameter(
                "chunk_size must be at least 1".into(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(AttestError::InvalidParameter(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

/// Retrieval defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results per query (default: 5).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Over-fetch multiplier when filtering by topic (default: 3).
    #[serde(default = "default_topic_overfetch")]
    pub topic_overfetch: usize,
    /// Named index to query (default: `"default"`).
    #[serde(default = "default_store_name")]
    pub store_name: String,
}

fn default_top_k() -> usize {
    5
}

fn default_topic_overfetch() -> usize {
    3
}

fn default_store_name() -> String {
    "default".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            topic_overfetch: default_topic_overfetch(),
            store_name: default_store_name(),
        }
    }
}

/// On-disk layout. All directories are created on demand under `data_dir`.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use attest_core::StorageConfig;
///
/// let storage = StorageConfig::default();
/// assert_eq!(storage.chunks_dir(), PathBuf::from("data/chunks"));
/// assert_eq!(storage.index_dir(), PathBuf::from("data/vector_index"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root data directory (default: `data`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl StorageConfig {
    /// Per-document chunk records.
    pub fn chunks_dir(&self) -> PathBuf {
        self.data_dir.join("chunks")
    }

    /// Named vector index artifacts.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("vector_index")
    }

    /// Persisted chat transcripts.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Chat behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Context chunks retrieved per chat turn (default: 3).
    #[serde(default = "default_chat_k")]
    pub k: usize,
    /// History messages handed to the model (default: 10).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_chat_k() -> usize {
    3
}

fn default_max_history() -> usize {
    10
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            k: default_chat_k(),
            max_history: default_max_history(),
        }
    }
}
