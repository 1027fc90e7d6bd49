//! HTTP LLM provider implementation
//!
//! Implements `LlmProvider` against any OpenAI-compatible `/v1/chat/completions`
//! endpoint (OpenAI, Ollama, LiteLLM, vLLM, ...).
//!
//! Configuration via environment variables:
//! - `LLM_URL` (required, e.g. `http://localhost:11434/v1/chat/completions`)
//! - `LLM_MODEL` (default: `llama3.1`)
//! - `LLM_API_KEY` (optional)

use super::traits::{ChatMessage, LlmProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// HTTP-based completion provider using the OpenAI chat completions format.
#[derive(Clone)]
pub struct HttpLlmProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpLlmProvider {
    /// Create a new provider with explicit configuration.
    pub fn new(url: String, model: String, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url,
            model,
            api_key,
        })
    }

    /// Create a provider from environment variables.
    ///
    /// Returns `None` when `LLM_URL` is unset, empty or "disabled".
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("LLM_URL").ok()?;
        if url.is_empty() || url.eq_ignore_ascii_case("disabled") {
            return None;
        }
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "llama3.1".to_string());
        let api_key = std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
        Self::new(url, model, api_key).ok()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Option<String>> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            wire.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for m in messages {
            wire.push(WireMessage {
                role: match m.role {
                    super::traits::Role::User => "user",
                    super::traits::Role::Assistant => "assistant",
                },
                content: &m.content,
            });
        }

        let body = CompletionRequest {
            model: &self.model,
            max_tokens,
            messages: wire,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to connect to LLM API at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(detail) = err.error {
                    anyhow::bail!("LLM API error ({}): {}", status.as_u16(), detail.message);
                }
            }
            anyhow::bail!("LLM API returned {}: {}", status.as_u16(), body);
        }

        let resp: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        Ok(resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
