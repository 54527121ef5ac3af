//! Retrieval-augmented chat over governed documents.
//!
//! Provides the completion client, per-session conversation state, prompt
//! assembly, the chat turn orchestration, and the [`context::AppContext`]
//! that wires them to the retrieval crate.

pub mod chatbot;
pub mod context;
pub mod llm;
pub mod prompt;
pub mod session;
