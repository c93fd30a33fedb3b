//! Chat completion backends for the problem-solving assistant.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::AssistantConfig;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Assistant is disabled")]
    Disabled,

    #[error("Assistant request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Assistant responded with HTTP {status}")]
    Upstream { status: u16 },

    #[error("Assistant returned an empty reply")]
    EmptyReply,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
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
}

#[async_trait]
pub trait Assistant: Send + Sync {
    /// Reply to a conversation. The first message may be a system prompt.
    async fn reply(&self, messages: &[ChatMessage]) -> Result<String, AssistantError>;
}

pub struct DisabledAssistant;

#[async_trait]
impl Assistant for DisabledAssistant {
    async fn reply(&self, _messages: &[ChatMessage]) -> Result<String, AssistantError> {
        Err(AssistantError::Disabled)
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiAssistant {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl OpenAiAssistant {
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn reply(&self, messages: &[ChatMessage]) -> Result<String, AssistantError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&CompletionRequest {
                model: &self.model,
                messages,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(AssistantError::Upstream {
                status: resp.status().as_u16(),
            });
        }

        let completion: CompletionResponse = resp.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AssistantError::EmptyReply)?;

        debug!(chars = content.len(), "Assistant replied");
        Ok(content)
    }
}
