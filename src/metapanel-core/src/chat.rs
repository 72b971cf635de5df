//! Chat backend client for Ollama-compatible endpoints.
//!
//! One request per panel answer: `POST {base_url}/api/chat` with the full
//! message list and `stream: false`. Any failure degrades to a fixed fallback
//! sentence instead of an error, so a dead endpoint can never abort a panel
//! run.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Default endpoint for a locally running Ollama.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Substituted for the answer whenever the chat backend fails.
pub const FALLBACK_ANSWER: &str =
    "“(Offline fallback) Here is a concise perspective based on my persona.”";

/// Wire-level message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Result of one chat call. `Fallback` is a first-class outcome, not an
/// error: the orchestrator treats it like any other answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Answer(String),
    Fallback,
}

impl ChatOutcome {
    /// The text to put in the transcript and speak aloud.
    pub fn text(&self) -> &str {
        match self {
            ChatOutcome::Answer(text) => text,
            ChatOutcome::Fallback => FALLBACK_ANSWER,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ChatOutcome::Fallback)
    }
}

/// Anything that can answer a chat request for a given model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> ChatOutcome;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// HTTP client for the Ollama chat API.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a client for the given base URL (trailing slashes are trimmed).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> ChatOutcome {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model,
            messages: &messages,
            stream: false,
        };
        debug!(model, message_count = messages.len(), "sending chat request");

        let response = match self.http.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, model, "chat request failed, using fallback answer");
                return ChatOutcome::Fallback;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), model, "chat endpoint returned an error, using fallback answer");
            return ChatOutcome::Fallback;
        }

        let parsed: ChatResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%error, model, "chat response was not valid JSON, using fallback answer");
                return ChatOutcome::Fallback;
            }
        };

        match parsed.message.and_then(|m| m.content) {
            Some(content) if !content.trim().is_empty() => ChatOutcome::Answer(content),
            _ => {
                warn!(model, "chat response had no content, using fallback answer");
                ChatOutcome::Fallback
            }
        }
    }
}
