//! Language model collaborator.
//!
//! [`LanguageModel`] is the seam the pipeline and the command classifier
//! call through. [`OpenAiChatModel`] speaks the OpenAI-compatible
//! `/v1/chat/completions` protocol (OpenAI, vLLM, llama.cpp server, ...).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{CompanionError, Result};
use crate::store::Role;

const SERVICE: &str = "llm";

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// What a completion is used for; selects sampling and output constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Free-form conversational reply.
    Conversation,
    /// A single JSON object describing a command.
    CommandJson,
    /// A short session title.
    Title,
}

/// Chat completion interface.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], mode: CompletionMode) -> Result<String>;
}

/// Build the JSON request body for the Chat Completions API.
pub fn build_completions_request(
    config: &LlmConfig,
    messages: &[ChatMessage],
    mode: CompletionMode,
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    let mut body = serde_json::json!({
        "model": config.model,
        "messages": messages,
    });
    if let Some(obj) = body.as_object_mut() {
        match mode {
            CompletionMode::Conversation => {
                obj.insert("temperature".into(), serde_json::json!(config.temperature));
                obj.insert("max_tokens".into(), serde_json::json!(config.max_tokens));
            }
            CompletionMode::CommandJson => {
                obj.insert("temperature".into(), serde_json::json!(0.0));
                obj.insert(
                    "response_format".into(),
                    serde_json::json!({"type": "json_object"}),
                );
            }
            CompletionMode::Title => {
                obj.insert("temperature".into(), serde_json::json!(0.3));
                obj.insert("max_tokens".into(), serde_json::json!(40));
            }
        }
    }
    body
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiChatModel {
    config: LlmConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatModel {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Config`] if the HTTP client cannot be built.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CompanionError::Config(format!("llm client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> CompanionError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 => CompanionError::collaborator(SERVICE, format!("authentication failed: {message}")),
            429 => CompanionError::collaborator(SERVICE, format!("rate limited: {message}")),
            code => CompanionError::collaborator(SERVICE, format!("HTTP {code}: {message}")),
        }
    }
}

/// Extract an error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, messages: &[ChatMessage], mode: CompletionMode) -> Result<String> {
        let body = build_completions_request(&self.config, messages, mode);
        debug!(?mode, messages = messages.len(), "chat completion request");

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompanionError::Timeout(SERVICE)
                } else {
                    CompanionError::collaborator(SERVICE, format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CompanionError::collaborator(SERVICE, format!("invalid response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CompanionError::collaborator(SERVICE, "empty completion"))
    }
}
