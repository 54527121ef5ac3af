//! Core types, configuration, and error handling for Attest.
//!
//! This crate provides the shared foundation used by all other Attest crates:
//! - [`AttestError`]: unified error type using `thiserror`
//! - [`AttestConfig`]: configuration loaded from `.attest.toml`
//! - Shared types: [`DocumentMetadata`], [`Chunk`], [`ScoredChunk`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    AttestConfig, ChatConfig, ChunkingConfig, EmbeddingConfig, LlmConfig, RetrievalConfig,
    StorageConfig,
};
pub use error::AttestError;
pub use types::{check_file_stem, chunk_id, Chunk, DocumentMetadata, OutputFormat, ScoredChunk};

/// A convenience `Result` type for Attest operations.
pub type Result<T> = std::result::Result<T, AttestError>;
