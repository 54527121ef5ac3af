//! Conversation sessions: ordered transcripts plus the selected topic.
//!
//! Sessions come into existence on first reference and are only ever
//! appended to. [`SessionManager`] keeps live sessions in memory and writes
//! them through a [`SessionStore`] on request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use attest_core::{check_file_stem, AttestError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, Role};

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&SessionMessage> for ChatMessage {
    fn from(message: &SessionMessage) -> Self {
        ChatMessage {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// A single conversation.
///
/// # Examples
///
/// ```
/// use attest_chat::llm::Role;
/// use attest_chat::session::ConversationSession;
///
/// let mut session = ConversationSession::new("s1");
/// session.push(Role::User, "hi");
/// session.push(Role::Assistant, "hello");
/// assert_eq!(session.recent(1)[0].content, "hello");
/// assert!(session.updated_at >= session.created_at);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub selected_topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    /// An empty session created now.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            selected_topic: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and advance `updated_at`.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        let timestamp = self.touch();
        self.messages.push(SessionMessage {
            role,
            content: content.into(),
            timestamp,
        });
    }

    /// Replace the selected topic and advance `updated_at`.
    pub fn set_topic(&mut self, topic: Option<String>) {
        self.selected_topic = topic;
        self.touch();
    }

    /// The last `max_messages` entries, oldest first.
    pub fn recent(&self, max_messages: usize) -> &[SessionMessage] {
        let start = self.messages.len().saturating_sub(max_messages);
        &self.messages[start..]
    }

    // wall clocks can step backwards; updated_at must not
    fn touch(&mut self) -> DateTime<Utc> {
        let now = Utc::now().max(self.updated_at);
        self.updated_at = now;
        now
    }
}

/// Durable storage for session transcripts, keyed by session id.
pub trait SessionStore: Send + Sync {
    /// Persist `session`, replacing any earlier copy.
    fn save(&self, session: &ConversationSession) -> Result<(), AttestError>;

    /// Load a session, or `None` if it was never saved. A saved session that
    /// cannot be read is an error, never `None`.
    fn load(&self, session_id: &str) -> Result<Option<ConversationSession>, AttestError>;
}

/// One pretty-printed JSON file per session.
///
/// Files are written to `{id}.json.tmp` and renamed into place, so an
/// interrupted save leaves the previous transcript intact.
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    dir: PathBuf,
}

impl JsonSessionStore {
    /// Use `dir` for session files. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, AttestError> {
        check_file_stem("session id", session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

impl SessionStore for JsonSessionStore {
    fn save(&self, session: &ConversationSession) -> Result<(), AttestError> {
        let path = self.path_for(&session.session_id)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            AttestError::Storage(format!(
                "failed to create session directory {}: {e}",
                self.dir.display()
            ))
        })?;
        let content = serde_json::to_string_pretty(session)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .and_then(|()| std::fs::rename(&tmp_path, &path))
            .map_err(|e| {
                AttestError::Storage(format!(
                    "failed to write session to {}: {e}",
                    path.display()
                ))
            })?;
        debug!(session = %session.session_id, "saved session");
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<ConversationSession>, AttestError> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            AttestError::Storage(format!(
                "failed to read session from {}: {e}",
                path.display()
            ))
        })?;
        let session = serde_json::from_str(&content).map_err(|e| {
            AttestError::Storage(format!(
                "session file {} is corrupted: {e}",
                path.display()
            ))
        })?;
        Ok(Some(session))
    }
}

/// Live sessions, optionally backed by a store.
///
/// Every operation takes the session map lock for its whole duration, so
/// concurrent appends to one session are serialised.
///
/// # Examples
///
/// ```
/// use attest_chat::llm::Role;
/// use attest_chat::session::SessionManager;
///
/// let manager = SessionManager::in_memory();
/// let id = manager.create_session();
/// manager.append_message(&id, Role::User, "what is the leave policy?");
/// assert_eq!(manager.recent_history(&id, 10).len(), 1);
///
/// // unknown ids are ignored, not errors
/// manager.append_message("nobody", Role::User, "lost");
/// assert!(manager.get_session("nobody").is_none());
/// ```
pub struct SessionManager {
    sessions: Mutex<HashMap<String, ConversationSession>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionManager {
    /// A manager whose sessions live only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// A manager that resumes and saves sessions through `store`.
    pub fn with_store(store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store: Some(store),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConversationSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new session with a fresh UUID and return its id.
    pub fn create_session(&self) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.lock()
            .insert(session_id.clone(), ConversationSession::new(&session_id));
        info!(session = %session_id, "created session");
        session_id
    }

    /// The session for `session_id`, creating it on first reference.
    ///
    /// A session saved by an earlier process is resumed from the store.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Storage`] if a saved session exists but cannot
    /// be read. Nothing is created in that case, so the saved transcript is
    /// never overwritten by an empty one.
    pub fn get_or_create(&self, session_id: &str) -> Result<ConversationSession, AttestError> {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get(session_id) {
            return Ok(session.clone());
        }

        let saved = match &self.store {
            Some(store) => store.load(session_id)?,
            None => None,
        };
        let session = match saved {
            Some(saved) => {
                info!(session = session_id, "resumed session");
                saved
            }
            None => {
                info!(session = session_id, "created session");
                ConversationSession::new(session_id)
            }
        };
        sessions.insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    /// A snapshot of a live session.
    pub fn get_session(&self, session_id: &str) -> Option<ConversationSession> {
        self.lock().get(session_id).cloned()
    }

    /// Append to a live session. Unknown ids are logged and ignored.
    pub fn append_message(&self, session_id: &str, role: Role, content: &str) {
        match self.lock().get_mut(session_id) {
            Some(session) => session.push(role, content),
            None => warn!(session = session_id, "append to unknown session ignored"),
        }
    }

    /// Change the selected topic of a live session. Unknown ids are logged
    /// and ignored.
    pub fn set_topic(&self, session_id: &str, topic: Option<String>) {
        match self.lock().get_mut(session_id) {
            Some(session) => session.set_topic(topic),
            None => warn!(session = session_id, "topic change for unknown session ignored"),
        }
    }

    /// The last `max_messages` messages of a session, oldest first.
    ///
    /// Unknown sessions have no history.
    pub fn recent_history(&self, session_id: &str, max_messages: usize) -> Vec<SessionMessage> {
        self.lock()
            .get(session_id)
            .map(|s| s.recent(max_messages).to_vec())
            .unwrap_or_default()
    }

    /// Write a live session through the store. A manager without a store
    /// accepts the call and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::SessionNotFound`] for unknown ids and storage
    /// errors from the store.
    pub fn save_session(&self, session_id: &str) -> Result<(), AttestError> {
        let session = self
            .get_session(session_id)
            .ok_or_else(|| AttestError::SessionNotFound(session_id.to_string()))?;
        match &self.store {
            Some(store) => store.save(&session),
            None => Ok(()),
        }
    }

    /// Write every live session through the store, returning how many were
    /// written. Failures are logged and skipped.
    pub fn save_all(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let snapshot: Vec<ConversationSession> = self.lock().values().cloned().collect();
        let mut saved = 0;
        for session in &snapshot {
            match store.save(session) {
                Ok(()) => saved += 1,
                Err(e) => warn!(session = %session.session_id, "failed to save session: {e}"),
            }
        }
        saved
    }

    /// Load a saved session into memory, replacing any live copy.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the store.
    pub fn load_session(&self, session_id: &str) -> Result<Option<ConversationSession>, AttestError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(session) = store.load(session_id)? else {
            return Ok(None);
        };
        self.lock().insert(session_id.to_string(), session.clone());
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_history_keeps_latest_in_order() {
        let manager = SessionManager::in_memory();
        let id = manager.get_or_create("s").unwrap().session_id;
        for m in ["m1", "m2", "m3", "m4"] {
            manager.append_message(&id, Role::User, m);
        }
        let window: Vec<String> = manager
            .recent_history(&id, 2)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(window, vec!["m3", "m4"]);
        assert_eq!(manager.recent_history(&id, 100).len(), 4);
        assert!(manager.recent_history(&id, 0).is_empty());
    }

    #[test]
    fn get_or_create_is_stable() {
        let manager = SessionManager::in_memory();
        let first = manager.get_or_create("abc").unwrap();
        manager.append_message("abc", Role::User, "hello");
        let second = manager.get_or_create("abc").unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.messages.len(), 1);
    }

    #[test]
    fn updated_at_advances_on_append_and_topic() {
        let manager = SessionManager::in_memory();
        let created = manager.get_or_create("s").unwrap();
        manager.append_message("s", Role::User, "q");
        let after_append = manager.get_session("s").unwrap();
        assert!(after_append.updated_at >= created.updated_at);

        manager.set_topic("s", Some("HR".into()));
        let after_topic = manager.get_session("s").unwrap();
        assert!(after_topic.updated_at >= after_append.updated_at);
        assert!(after_topic.updated_at >= after_topic.created_at);
        assert_eq!(after_topic.selected_topic.as_deref(), Some("HR"));
    }

    #[test]
    fn unknown_sessions_are_not_created_by_mutations() {
        let manager = SessionManager::in_memory();
        manager.set_topic("ghost", Some("HR".into()));
        manager.append_message("ghost", Role::User, "boo");
        assert!(manager.get_session("ghost").is_none());
        assert!(matches!(
            manager.save_session("ghost"),
            Err(AttestError::SessionNotFound(_))
        ));
    }

    #[test]
    fn sessions_round_trip_through_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(JsonSessionStore::new(dir.path()));

        let manager = SessionManager::with_store(Arc::clone(&store));
        manager.get_or_create("persisted").unwrap();
        manager.append_message("persisted", Role::User, "q");
        manager.append_message("persisted", Role::Assistant, "a");
        manager.save_session("persisted").unwrap();

        // a second process resumes the transcript
        let resumed = SessionManager::with_store(store);
        let session = resumed.get_or_create("persisted").unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].role, Role::Assistant);
    }

    #[test]
    fn json_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::new(dir.path());
        assert!(store.load("../escape").is_err());
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::new(dir.path());
        let mut session = ConversationSession::new("tidy");
        session.push(Role::User, "q");
        store.save(&session).unwrap();
        session.push(Role::Assistant, "a");
        store.save(&session).unwrap();

        assert!(!dir.path().join("tidy.json.tmp").exists());
        assert_eq!(store.load("tidy").unwrap().unwrap().messages.len(), 2);
    }

    #[test]
    fn corrupted_session_file_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(JsonSessionStore::new(dir.path()));

        let manager = SessionManager::with_store(Arc::clone(&store));
        manager.get_or_create("kept").unwrap();
        for m in ["m1", "m2", "m3"] {
            manager.append_message("kept", Role::User, m);
        }
        manager.save_session("kept").unwrap();

        let path = dir.path().join("kept.json");
        let full = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, &full[..full.len() / 2]).unwrap();
        let truncated = std::fs::read_to_string(&path).unwrap();

        let restarted = SessionManager::with_store(store);
        let err = restarted.get_or_create("kept").unwrap_err();
        assert!(matches!(err, AttestError::Storage(_)));
        assert!(restarted.get_session("kept").is_none());

        restarted.append_message("kept", Role::User, "m4");
        assert!(restarted.save_session("kept").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), truncated);
    }
}
