//! HTTP embedding provider
//!
//! Calls any OpenAI-compatible `/v1/embeddings` endpoint (Ollama, OpenAI,
//! LiteLLM, vLLM, ...). When no endpoint is configured the engine runs on
//! the local embedder alone.
//!
//! Configuration via environment variables:
//! - `EMBEDDING_URL` (unset, empty or `disabled` turns the provider off)
//! - `EMBEDDING_MODEL` (default: `nomic-embed-text`)
//! - `EMBEDDING_API_KEY` (optional)
//! - `EMBEDDING_DIMENSIONS` (default: `384`)

use super::traits::EmbeddingProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default provider dimensionality, matching the local embedder.
pub const DEFAULT_DIMENSIONS: usize = super::local::EMBEDDING_DIM;

/// Provider requests are split into chunks of this many inputs.
const BATCH_SIZE: usize = 50;

#[derive(Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpEmbeddingProvider {
    pub fn new(
        url: String,
        model: String,
        api_key: Option<String>,
        dimensions: usize,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url,
            model,
            api_key,
            dimensions,
        })
    }

    /// Create a provider from environment variables.
    ///
    /// Returns `None` when `EMBEDDING_URL` is unset, empty or "disabled".
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("EMBEDDING_URL").ok()?;
        if url.is_empty() || url.eq_ignore_ascii_case("disabled") {
            return None;
        }

        let model =
            std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "nomic-embed-text".to_string());
        let api_key = std::env::var("EMBEDDING_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let dimensions: usize = std::env::var("EMBEDDING_DIMENSIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DIMENSIONS);

        match Self::new(url, model, api_key, dimensions) {
            Ok(provider) => Some(provider),
            Err(e) => {
                tracing::warn!("Embedding provider disabled: {:#}", e);
                None
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request_embeddings(&self, input: EmbeddingInput) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to connect to embedding API at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(detail) = err.error {
                    anyhow::bail!(
                        "Embedding API error ({}): {}",
                        status.as_u16(),
                        detail.message
                    );
                }
            }
            anyhow::bail!("Embedding API returned {}: {}", status.as_u16(), body);
        }

        let resp: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding API response")?;

        let mut data = resp.data;
        data.sort_by_key(|d| d.index);
        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        for (i, emb) in embeddings.iter().enumerate() {
            if emb.len() != self.dimensions {
                anyhow::bail!(
                    "Embedding dimension mismatch at index {}: expected {}, got {} (model: {})",
                    i,
                    self.dimensions,
                    emb.len(),
                    self.model
                );
            }
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.request_embeddings(EmbeddingInput::Single(text.to_string()))
            .await?
            .into_iter()
            .next()
            .context("Embedding API returned empty response")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let mut embeddings = self
                .request_embeddings(EmbeddingInput::Batch(chunk.to_vec()))
                .await?;
            if embeddings.len() != chunk.len() {
                anyhow::bail!(
                    "Embedding API returned {} vectors for {} inputs",
                    embeddings.len(),
                    chunk.len()
                );
            }
            all.append(&mut embeddings);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Env vars are process-global; keep every env phase in one test.
    #[test]
    fn test_from_env_lifecycle() {
        fn clear_env() {
            std::env::remove_var("EMBEDDING_URL");
            std::env::remove_var("EMBEDDING_MODEL");
            std::env::remove_var("EMBEDDING_API_KEY");
            std::env::remove_var("EMBEDDING_DIMENSIONS");
        }

        // Unset: local-only
        clear_env();
        assert!(HttpEmbeddingProvider::from_env().is_none());

        // Defaults once a URL is present
        std::env::set_var("EMBEDDING_URL", "http://localhost:11434/v1/embeddings");
        let provider = HttpEmbeddingProvider::from_env().unwrap();
        assert_eq!(provider.model, "nomic-embed-text");
        assert!(provider.api_key.is_none());
        assert_eq!(provider.dimensions, 384);

        // Custom values
        std::env::set_var("EMBEDDING_MODEL", "text-embedding-3-small");
        std::env::set_var("EMBEDDING_API_KEY", "sk-test-key");
        std::env::set_var("EMBEDDING_DIMENSIONS", "1536");
        let provider = HttpEmbeddingProvider::from_env().unwrap();
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.api_key.as_deref(), Some("sk-test-key"));
        assert_eq!(provider.dimensions(), 1536);

        // Explicitly disabled
        std::env::set_var("EMBEDDING_URL", "disabled");
        assert!(HttpEmbeddingProvider::from_env().is_none());
        std::env::set_var("EMBEDDING_URL", "");
        assert!(HttpEmbeddingProvider::from_env().is_none());

        clear_env();
    }

    #[tokio::test]
    async fn test_batch_sorted_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0}
                ]
            })))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(server.uri(), "m".into(), None, 2).unwrap();
        let out = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0, 0.0, 0.0], "index": 0}]
            })))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(server.uri(), "m".into(), None, 2).unwrap();
        let err = provider.embed_text("a").await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"message": "model not loaded"}
            })))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(server.uri(), "m".into(), None, 2).unwrap();
        let err = provider.embed_text("a").await.unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }
}
