pub mod claude;

pub use claude::ClaudeClient;

use crate::state::ChatMessage;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// One block of a provider reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Model parameters sent with every completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: claude::DEFAULT_MODEL.to_string(),
            max_tokens: claude::DEFAULT_MAX_TOKENS,
            temperature: claude::DEFAULT_TEMPERATURE,
        }
    }
}

/// Everything a provider needs to produce the next assistant turn
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(settings: &CompletionSettings, system: String, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            system,
            messages,
        }
    }
}

/// A chat-completion backend
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<ContentBlock>>;
}
