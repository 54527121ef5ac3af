//! One chat turn: session bookkeeping, retrieval, prompt, completion.

use std::sync::Arc;

use attest_core::{AttestError, ChatConfig, ScoredChunk};
use attest_retrieval::chunk_store::ChunkStore;
use attest_retrieval::retriever::Retriever;
use serde::Serialize;
use tracing::{info, warn};

use crate::llm::{Completer, Role};
use crate::prompt::build_chat_prompt;
use crate::session::SessionManager;

/// Messages answered without looking anything up.
const SMALL_TALK: &[&str] = &["hello", "hi", "help", "topics"];

/// A retrieved chunk cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub chunk_id: String,
    pub document_title: String,
    pub document_type: String,
    /// Squared L2 distance; lower is closer.
    pub similarity_score: f32,
}

impl From<&ScoredChunk> for Source {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            chunk_id: scored.chunk.chunk_id.clone(),
            document_title: scored.chunk.metadata.title.clone(),
            document_type: scored.chunk.metadata.document_type.clone(),
            similarity_score: scored.score,
        }
    }
}

/// Result of [`ChatEngine::chat`].
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: String,
    pub message: String,
    /// Topic in effect for this turn.
    pub topic: Option<String>,
    pub sources: Vec<Source>,
    pub available_topics: Vec<String>,
}

/// Whether `message` is a greeting or meta request that needs no context.
///
/// # Examples
///
/// ```
/// use attest_chat::chatbot::is_small_talk;
///
/// assert!(is_small_talk("Hello"));
/// assert!(!is_small_talk("hello, what is the leave policy?"));
/// ```
pub fn is_small_talk(message: &str) -> bool {
    let normalized = message.trim().to_lowercase();
    SMALL_TALK.contains(&normalized.as_str())
}

/// Retrieval-augmented chat over one named index.
pub struct ChatEngine {
    retriever: Retriever,
    completer: Arc<dyn Completer>,
    sessions: Arc<SessionManager>,
    chunks: Arc<ChunkStore>,
    store_name: String,
    config: ChatConfig,
}

impl ChatEngine {
    /// An engine answering from `store_name` with the given collaborators.
    pub fn new(
        retriever: Retriever,
        completer: Arc<dyn Completer>,
        sessions: Arc<SessionManager>,
        chunks: Arc<ChunkStore>,
        store_name: impl Into<String>,
        config: ChatConfig,
    ) -> Self {
        Self {
            retriever,
            completer,
            sessions,
            chunks,
            store_name: store_name.into(),
            config,
        }
    }

    /// The session manager shared with the application context.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Answer `message` within `session_id`.
    ///
    /// A `topic` replaces the session's selected topic; without one the
    /// session's topic applies. Retrieval problems degrade to an answer
    /// without context. The turn, including a new topic, is recorded only
    /// after the completion succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::CompletionService`] if the completion fails. In
    /// that case the session is unchanged. Returns [`AttestError::Storage`]
    /// if a saved session exists but cannot be read.
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        topic: Option<&str>,
    ) -> Result<ChatReply, AttestError> {
        info!(
            session = session_id,
            topic = topic.unwrap_or("-"),
            "chat request: '{}'",
            message.chars().take(50).collect::<String>()
        );

        let session = self.sessions.get_or_create(session_id)?;
        let topic_changed = topic.is_some_and(|t| session.selected_topic.as_deref() != Some(t));
        let topic = topic.map(str::to_string).or(session.selected_topic);

        let contexts = if is_small_talk(message) {
            Vec::new()
        } else {
            match self
                .retriever
                .retrieve(&self.store_name, message, self.config.k, topic.as_deref())
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    warn!(session = session_id, "context retrieval failed: {e}");
                    Vec::new()
                }
            }
        };

        let history = self
            .sessions
            .recent_history(session_id, self.config.max_history);
        let prompt = build_chat_prompt(message, &contexts, &history, topic.as_deref());

        let answer = self.completer.complete(&prompt).await?;
        info!(session = session_id, chars = answer.len(), "generated response");

        if topic_changed {
            self.sessions.set_topic(session_id, topic.clone());
        }
        self.sessions.append_message(session_id, Role::User, message);
        self.sessions
            .append_message(session_id, Role::Assistant, &answer);
        if let Err(e) = self.sessions.save_session(session_id) {
            warn!(session = session_id, "failed to save session: {e}");
        }

        let available_topics = self.chunks.available_topics().unwrap_or_else(|e| {
            warn!("could not list topics: {e}");
            Vec::new()
        });

        Ok(ChatReply {
            session_id: session_id.to_string(),
            message: answer,
            topic,
            sources: contexts.iter().map(Source::from).collect(),
            available_topics,
        })
    }
}
