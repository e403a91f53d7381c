/// Language model collaborators
///
/// The generation backend streams chat replies fragment by fragment; the
/// embedder turns text into fixed-length vectors for semantic search. Both are
/// constructed once at startup and shared through the application context.

mod ollama;
#[cfg(test)]
pub(crate) mod fakes;

pub use ollama::OllamaClient;

use crate::{
    config::LlmConfig,
    db::models::{Role, Turn},
    error::ParlorResult,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Role of a message sent to the generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

/// One message of the context sent to the generation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

impl From<Turn> for ChatMessage {
    fn from(turn: Turn) -> Self {
        Self {
            role: turn.role.into(),
            content: turn.content,
        }
    }
}

/// Sampling options passed with every generation request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for GenerationOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Reply fragments in generation order
pub type TokenStream = Pin<Box<dyn Stream<Item = ParlorResult<String>> + Send>>;

/// Text-generation backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open an incremental generation request
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> ParlorResult<TokenStream>;

    /// Generate a complete reply in one call
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> ParlorResult<String> {
        let mut stream = self.stream_chat(messages, options).await?;
        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            reply.push_str(&fragment?);
        }
        Ok(reply)
    }
}

/// Text embedding backend
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ParlorResult<Vec<f32>>;
}
