//! Governed ingestion, embedding, vector indexing, and retrieval.
//!
//! Documents pass the approval gate, are split into overlapping word windows,
//! embedded through an OpenAI-compatible endpoint, and stored in a
//! brute-force L2 index persisted as a single SQLite file per store. Queries
//! embed the question, scan the index, and optionally narrow results to one
//! `document_type`.

pub mod builder;
pub mod chunk_store;
pub mod chunker;
pub mod embedding;
pub mod governance;
pub mod index;
pub mod ingest;
pub mod registry;
pub mod retriever;
pub mod store;
