//! Integration test: ingest → build → chat with in-process model doubles.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use attest_chat::context::AppContext;
use attest_chat::llm::{ChatMessage, Completer, Role};
use attest_core::{AttestConfig, AttestError, DocumentMetadata, StorageConfig};
use attest_retrieval::embedding::Embedder;

/// Embeds by keyword so "leave" questions land on HR text.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttestError> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                let mut v = vec![0.0; 4];
                v[0] = t.matches("leave").count() as f32;
                v[1] = t.matches("deploy").count() as f32;
                v[2] = t.matches("expense").count() as f32;
                v[3] = 1.0;
                v
            })
            .collect())
    }
}

/// Records every prompt and answers with a canned reply.
#[derive(Default)]
struct ScriptedCompleter {
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
    fail: bool,
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AttestError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if self.fail {
            return Err(AttestError::CompletionService("model unavailable".into()));
        }
        Ok(format!("answer #{}", self.prompts.lock().unwrap().len()))
    }
}

fn config(dir: &std::path::Path) -> AttestConfig {
    let mut config = AttestConfig {
        storage: StorageConfig {
            data_dir: dir.to_path_buf(),
        },
        ..AttestConfig::default()
    };
    config.embedding.dimensions = 4;
    config.chat.max_history = 2;
    config
}

fn doc(title: &str, topic: &str) -> DocumentMetadata {
    DocumentMetadata::new(title, topic, "1.0", true, "reviewer")
}

async fn seeded(dir: &std::path::Path, completer: Arc<ScriptedCompleter>) -> AppContext {
    let ctx = AppContext::with_components(config(dir), Arc::new(KeywordEmbedder), completer).unwrap();
    let ingestor = ctx.ingestor();
    ingestor
        .ingest_text("Parental leave is sixteen weeks. Annual leave is twenty days.", doc("Leave", "HR"))
        .unwrap();
    ingestor
        .ingest_text("Every deploy goes through the staging pipeline.", doc("Deploys", "Engineering"))
        .unwrap();
    ingestor
        .ingest_text("Submit each expense within thirty days.", doc("Expenses", "Finance"))
        .unwrap();
    ctx.index_builder().build("default", true, None).await.unwrap();
    ctx
}

#[tokio::test]
async fn chat_grounds_answer_in_topic_context() {
    let dir = tempfile::tempdir().unwrap();
    let completer = Arc::new(ScriptedCompleter::default());
    let ctx = seeded(dir.path(), Arc::clone(&completer)).await;

    let reply = ctx
        .chat_engine()
        .chat("s1", "How much leave do I get?", Some("HR"))
        .await
        .unwrap();

    assert_eq!(reply.message, "answer #1");
    assert_eq!(reply.topic.as_deref(), Some("HR"));
    assert!(!reply.sources.is_empty());
    assert!(reply.sources.iter().all(|s| s.document_type == "HR"));
    assert_eq!(reply.available_topics, vec!["Engineering", "Finance", "HR"]);

    let prompts = completer.prompts.lock().unwrap();
    let system = &prompts[0][0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("[Source 1]\nParental leave"));
    assert!(system.content.contains("HR documents only"));
}

#[tokio::test]
async fn topic_sticks_to_the_session_and_history_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let completer = Arc::new(ScriptedCompleter::default());
    let ctx = seeded(dir.path(), Arc::clone(&completer)).await;
    let engine = ctx.chat_engine();

    engine.chat("s2", "leave policy?", Some("HR")).await.unwrap();
    let second = engine.chat("s2", "and expense rules?", None).await.unwrap();
    assert_eq!(second.topic.as_deref(), Some("HR"));
    assert!(second.sources.iter().all(|s| s.document_type == "HR"));

    engine.chat("s2", "hello", None).await.unwrap();

    // max_history = 2: system + last two messages + user
    let prompts = completer.prompts.lock().unwrap();
    let third = &prompts[2];
    assert_eq!(third.len(), 4);
    assert_eq!(third[1].content, "and expense rules?");
    assert_eq!(third[2].content, "answer #2");
    assert_eq!(third[3].content, "hello");
    // small talk skips retrieval
    assert!(!third[0].content.contains("[Source"));

    let session = ctx.sessions().get_session("s2").unwrap();
    assert_eq!(session.messages.len(), 6);
}

#[tokio::test]
async fn failed_completion_leaves_transcript_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let completer = Arc::new(ScriptedCompleter {
        fail: true,
        ..ScriptedCompleter::default()
    });
    let ctx = seeded(dir.path(), completer).await;

    let err = ctx
        .chat_engine()
        .chat("s3", "leave?", Some("HR"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    let session = ctx.sessions().get_session("s3").unwrap();
    assert!(session.messages.is_empty());
    assert!(session.selected_topic.is_none());
    assert_eq!(session.updated_at, session.created_at);
}

#[tokio::test]
async fn chat_without_an_index_still_answers() {
    let dir = tempfile::tempdir().unwrap();
    let completer = Arc::new(ScriptedCompleter::default());
    let ctx = AppContext::with_components(config(dir.path()), Arc::new(KeywordEmbedder), completer)
        .unwrap();

    let reply = ctx.chat_engine().chat("s4", "leave?", None).await.unwrap();
    assert!(reply.sources.is_empty());
    assert!(reply.available_topics.is_empty());
}

#[tokio::test]
async fn sessions_persist_across_contexts() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = seeded(dir.path(), Arc::new(ScriptedCompleter::default())).await;
        ctx.chat_engine().chat("durable", "leave?", None).await.unwrap();
        ctx.shutdown();
    }

    let ctx = AppContext::with_components(
        config(dir.path()),
        Arc::new(KeywordEmbedder),
        Arc::new(ScriptedCompleter::default()),
    )
    .unwrap();
    let history = ctx.sessions().get_or_create("durable").unwrap();
    assert_eq!(history.messages.len(), 2);
    assert_eq!(history.messages[0].content, "leave?");
}

#[tokio::test]
async fn unreadable_saved_session_fails_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    let completer = Arc::new(ScriptedCompleter::default());
    let ctx = seeded(dir.path(), Arc::clone(&completer)).await;

    let path = ctx.config().storage.sessions_dir().join("broken.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{\"session_id\": \"broken\", \"mess").unwrap();

    let err = ctx.chat_engine().chat("broken", "leave?", None).await.unwrap_err();
    assert!(matches!(err, AttestError::Storage(_)));
    assert!(completer.prompts.lock().unwrap().is_empty());
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "{\"session_id\": \"broken\", \"mess"
    );
}
