/// Errors that can occur across the Attest platform.
///
/// Governance, parameter and dimension errors are operator mistakes and are
/// raised before any state is committed. Only the two service variants are
/// considered transient; nothing in the library retries them.
///
/// # Examples
///
/// ```
/// use attest_core::AttestError;
///
/// let err = AttestError::IndexNotFound("default".into());
/// assert!(err.to_string().contains("default"));
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum AttestError {
    /// Bad chunking or configuration arguments.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A document failed the approval gate.
    #[error("governance error: {0}")]
    Governance(String),

    /// An embedding did not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// Query against a store that was never built or loaded.
    #[error("vector store '{0}' not found")]
    #[diagnostic(help("build the index first with `attest build`"))]
    IndexNotFound(String),

    /// The external embedding service failed.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// The external completion service failed.
    #[error("completion service error: {0}")]
    CompletionService(String),

    /// A chat session id that has never been seen.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Index or chunk store corruption or database failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AttestError {
    /// Whether the failure came from an external service and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AttestError::EmbeddingService(_) | AttestError::CompletionService(_)
        )
    }
}
