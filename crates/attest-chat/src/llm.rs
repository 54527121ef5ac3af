use std::time::Duration;

use async_trait::async_trait;
use attest_core::{AttestError, LlmConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use attest_chat::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("How many vacation days do I get?");
/// assert_eq!(msg.role, Role::User);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use attest_chat::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Produces the assistant's answer for a prepared conversation.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete `messages`, returning the assistant text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AttestError>;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes `/chat/completions` under its base
/// URL: OpenAI, Azure-style gateways, Ollama, vLLM, LiteLLM.
///
/// # Examples
///
/// ```
/// use attest_core::LlmConfig;
/// use attest_chat::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// The API key falls back to `OPENAI_API_KEY`; local endpoints may need
    /// none at all.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, AttestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AttestError::Config(format!("failed to create HTTP client: {e}")))?;
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl Completer for LlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AttestError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        debug!(model = %self.config.model, messages = messages.len(), "requesting completion");

        let mut request = self.client.post(self.url());
        if let Some(api_key) = &self.api_key {
            request = request
                .header("Authorization", format!("Bearer {api_key}"))
                .header("api-key", api_key);
        }

        let response = request.json(&body).send().await.map_err(|e| {
            error!("completion request failed: {e}");
            AttestError::CompletionService(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            error!(%status, "completion API error");
            return Err(AttestError::CompletionService(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response.json().await.map_err(|e| {
            AttestError::CompletionService(format!("failed to parse response: {e}"))
        })?;

        extract_content(&response_body)
    }
}

fn extract_content(response_body: &serde_json::Value) -> Result<String, AttestError> {
    response_body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AttestError::CompletionService(format!(
                "unexpected response structure: {response_body}"
            ))
        })
}
