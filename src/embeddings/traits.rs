//! EmbeddingProvider trait definition
//!
//! Remote or model-backed embedding source consulted before the local
//! TF-IDF embedder. Async trait + Send + Sync for `Arc<dyn EmbeddingProvider>`
//! usage, same as `LlmProvider` and `BoardStore`.

use anyhow::Result;
use async_trait::async_trait;

/// Abstract interface for generating vector embeddings from text.
///
/// # Implementations
///
/// - [`HttpEmbeddingProvider`](super::HttpEmbeddingProvider): any
///   OpenAI-compatible `/v1/embeddings` endpoint
/// - [`MockEmbeddingProvider`](super::MockEmbeddingProvider): deterministic
///   hash-based vectors, optionally failing (for fallback tests)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Any error makes the [`EmbeddingEngine`](super::EmbeddingEngine) fall
    /// back to the local embedder for this call.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}
