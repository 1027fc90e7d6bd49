//! LlmProvider trait definition
//!
//! Minimal completion contract used by agents. Same pattern as
//! `EmbeddingProvider`: async trait + Send + Sync for `Arc<dyn LlmProvider>` usage.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Abstract interface for text completion.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a conversation.
    ///
    /// `Ok(None)` means the model produced no output; the calling agent decides
    /// whether that is a low-signal completion or a failure.
    ///
    /// # Errors
    ///
    /// Returns an error on transport or API failure. The agent task is then
    /// marked failed.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Option<String>>;

    /// The model identifier, for logs.
    fn model_name(&self) -> &str;
}
