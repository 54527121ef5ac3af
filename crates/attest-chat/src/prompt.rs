use attest_core::ScoredChunk;

use crate::llm::ChatMessage;
use crate::session::SessionMessage;

const SYSTEM_PROMPT: &str = "\
You are a knowledgeable assistant with access to a library of approved \
documents. Answer questions accurately using the context supplied below.

Guidelines:
- Keep answers concise and grounded in the context
- If the context does not contain the answer, say so plainly
- Cite the relevant sources when you rely on them
- Keep a friendly, professional tone
- Use the earlier conversation when it helps";

/// Build the system message for a chat turn.
///
/// # Examples
///
/// ```
/// use attest_chat::prompt::build_system_message;
///
/// let system = build_system_message(&[], Some("HR"));
/// assert!(system.contains("Current topic filter: HR documents only."));
/// assert!(!system.contains("[Source"));
/// ```
pub fn build_system_message(contexts: &[ScoredChunk], topic: Option<&str>) -> String {
    let mut system = SYSTEM_PROMPT.to_string();

    if let Some(topic) = topic {
        system.push_str(&format!("\n\nCurrent topic filter: {topic} documents only."));
    }

    if !contexts.is_empty() {
        let sources: Vec<String> = contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| format!("[Source {}]\n{}", i + 1, ctx.chunk.text))
            .collect();
        system.push_str("\n\nRelevant Context:\n");
        system.push_str(&sources.join("\n\n"));
    }

    system
}

/// Assemble the completion request: system message first, then `history`
/// in order, then `user_message` last.
///
/// The caller bounds `history`; nothing is dropped here.
///
/// # Examples
///
/// ```
/// use attest_chat::llm::Role;
/// use attest_chat::prompt::build_chat_prompt;
///
/// let messages = build_chat_prompt("How long is parental leave?", &[], &[], None);
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[0].role, Role::System);
/// assert_eq!(messages[1].content, "How long is parental leave?");
/// ```
pub fn build_chat_prompt(
    user_message: &str,
    contexts: &[ScoredChunk],
    history: &[SessionMessage],
    topic: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(build_system_message(contexts, topic)));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(user_message));
    messages
}

#[cfg(test)]
mod tests {
    use attest_core::{Chunk, DocumentMetadata};
    use chrono::Utc;

    use super::*;
    use crate::llm::Role;

    fn context(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new("d", 0, text, DocumentMetadata::new("t", "HR", "1", true, "x")),
            score: 0.5,
        }
    }

    fn message(role: Role, content: &str) -> SessionMessage {
        SessionMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn sources_are_numbered_from_one() {
        let system = build_system_message(&[context("first"), context("second")], None);
        assert!(system.contains("Relevant Context:\n[Source 1]\nfirst\n\n[Source 2]\nsecond"));
        assert!(!system.contains("topic filter"));
    }

    #[test]
    fn history_sits_between_system_and_user() {
        let history = vec![message(Role::User, "earlier q"), message(Role::Assistant, "earlier a")];
        let messages = build_chat_prompt("now", &[context("ctx")], &history, Some("HR"));

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[1].content, "earlier q");
        assert_eq!(messages.last().unwrap().content, "now");
        assert!(messages[0].content.contains("HR documents only"));
    }
}
