//! Embedding engine
//!
//! Front door for every embedding in a session: tries the delegated
//! provider first, falls back to the local TF-IDF embedder on any provider
//! error, and memoizes results in a bounded cache.

use super::local::{LocalEmbedder, EMBEDDING_DIM};
use super::traits::EmbeddingProvider;
use anyhow::Result;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Cache capacity (entries).
pub const CACHE_CAPACITY: usize = 1000;
/// Characters of the text that take part in the cache key.
const CACHE_KEY_PREFIX: usize = 200;
/// Texts longer than this many characters are embedded on the blocking pool.
pub const BLOCKING_THRESHOLD: usize = 8192;
/// Inputs are truncated to this many characters.
pub const MAX_INPUT_CHARS: usize = 32_768;

type CacheKey = (String, usize);

/// A stored vector to rank against a query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: Uuid,
    pub vector: Vec<f32>,
}

/// A search result, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub id: Uuid,
    pub score: f32,
}

pub struct EmbeddingEngine {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    local: Arc<Mutex<LocalEmbedder>>,
    // Hits use `peek`, so eviction order is insertion order
    cache: Mutex<LruCache<CacheKey, Vec<f32>>>,
}

impl Default for EmbeddingEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EmbeddingEngine {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self::with_capacity(provider, CACHE_CAPACITY)
    }

    pub fn with_capacity(provider: Option<Arc<dyn EmbeddingProvider>>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            local: Arc::new(Mutex::new(LocalEmbedder::new())),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Embed one text. Never fails: provider errors fall back to the local
    /// embedder for this call only.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let text = truncate_chars(text, MAX_INPUT_CHARS);
        let key = cache_key(text);
        if let Some(hit) = self.cache().peek(&key) {
            return hit.clone();
        }

        let vector = match self.embed_with_provider(text).await {
            Some(v) => v,
            None => self.embed_local(text).await,
        };

        self.cache().put(key, vector.clone());
        vector
    }

    /// Embed several texts, one vector per input in order.
    ///
    /// Cache misses go to the provider as a single batch; if that batch
    /// fails every miss is embedded locally.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| truncate_chars(t, MAX_INPUT_CHARS))
            .collect();

        let mut out: Vec<Option<Vec<f32>>> = {
            let cache = self.cache();
            inputs
                .iter()
                .map(|t| cache.peek(&cache_key(t)).cloned())
                .collect()
        };

        let misses: Vec<usize> = (0..inputs.len()).filter(|&i| out[i].is_none()).collect();
        if misses.is_empty() {
            return out.into_iter().flatten().collect();
        }

        let mut remote: Option<Vec<Vec<f32>>> = None;
        if let Some(provider) = &self.provider {
            let batch: Vec<String> = misses.iter().map(|&i| inputs[i].to_string()).collect();
            match provider.embed_batch(&batch).await {
                Ok(vectors) if vectors.len() == batch.len() => remote = Some(vectors),
                Ok(vectors) => tracing::warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "Embedding provider returned a short batch, using local embedder"
                ),
                Err(e) => tracing::warn!(
                    model = provider.model_name(),
                    "Embedding provider batch failed, using local embedder: {:#}",
                    e
                ),
            }
        }

        match remote {
            Some(vectors) => {
                for (&i, v) in misses.iter().zip(vectors) {
                    out[i] = Some(v);
                }
            }
            None => {
                for &i in &misses {
                    out[i] = Some(self.embed_local(inputs[i]).await);
                }
            }
        }

        {
            let mut cache = self.cache();
            for &i in &misses {
                if let Some(v) = &out[i] {
                    cache.put(cache_key(inputs[i]), v.clone());
                }
            }
        }

        out.into_iter().flatten().collect()
    }

    /// Rank `candidates` against `query`: scores below `min_score` are
    /// dropped, the rest sorted descending and truncated to `top_k`.
    pub async fn search_similar(
        &self,
        query: &str,
        candidates: &[Candidate],
        top_k: usize,
        min_score: f32,
    ) -> Vec<SimilarityHit> {
        let query_vec = self.embed(query).await;
        rank(&query_vec, candidates, top_k, min_score)
    }

    /// Documents in the local corpus.
    pub fn corpus_size(&self) -> u64 {
        lock(&self.local).total_docs()
    }

    pub fn cache_len(&self) -> usize {
        self.cache().len()
    }

    /// Drop the cache and the local corpus.
    pub fn reset(&self) {
        self.cache().clear();
        lock(&self.local).reset();
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<CacheKey, Vec<f32>>> {
        lock(&self.cache)
    }

    async fn embed_with_provider(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.provider.as_ref()?;
        if text.trim().is_empty() {
            return None;
        }
        match provider.embed_text(text).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    model = provider.model_name(),
                    "Embedding provider failed, using local embedder: {:#}",
                    e
                );
                None
            }
        }
    }

    async fn embed_local(&self, text: &str) -> Vec<f32> {
        if text.chars().count() <= BLOCKING_THRESHOLD {
            return lock(&self.local).embed(text);
        }

        let local = Arc::clone(&self.local);
        let owned = text.to_string();
        match tokio::task::spawn_blocking(move || lock(&local).embed(&owned)).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Local embedding task failed: {}", e);
                vec![0.0; EMBEDDING_DIM]
            }
        }
    }
}

/// Rank precomputed candidates against a query vector.
pub fn rank(
    query: &[f32],
    candidates: &[Candidate],
    top_k: usize,
    min_score: f32,
) -> Vec<SimilarityHit> {
    let mut hits: Vec<SimilarityHit> = candidates
        .iter()
        .map(|c| SimilarityHit {
            id: c.id,
            score: cosine_similarity(query, &c.vector),
        })
        .filter(|h| h.score >= min_score)
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_k);
    hits
}

/// Cosine similarity; 0 for mismatched lengths or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Serialize a vector as little-endian f32 bytes.
pub fn to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Inverse of [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!(
            "Embedding byte length {} is not a multiple of 4",
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn cache_key(text: &str) -> CacheKey {
    (
        truncate_chars(text, CACHE_KEY_PREFIX).to_string(),
        text.chars().count(),
    )
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;

    #[tokio::test]
    async fn test_repeat_embedding_is_bit_identical() {
        let engine = EmbeddingEngine::default();
        let a = engine.embed("The launch slipped by two weeks").await;
        let b = engine.embed("The launch slipped by two weeks").await;
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
        // Second call was a cache hit
        assert_eq!(engine.corpus_size(), 1);
    }

    #[test]
    fn test_cosine_similarity_edges() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&v, &[0.3, 0.4]), 0.0);
        assert_eq!(cosine_similarity(&v, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_self_similarity_is_one() {
        let engine = EmbeddingEngine::default();
        let v = engine.embed("budget review for the marketing team").await;
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_cache_evicts_in_insertion_order() {
        let engine = EmbeddingEngine::with_capacity(None, 2);
        engine.embed("first text").await;
        engine.embed("second text").await;
        // A hit must not refresh "first text"
        engine.embed("first text").await;
        engine.embed("third text").await;
        assert_eq!(engine.cache_len(), 2);

        let before = engine.corpus_size();
        engine.embed("first text").await;
        assert_eq!(engine.corpus_size(), before + 1, "first text was evicted");
        engine.embed("third text").await;
        assert_eq!(engine.corpus_size(), before + 1, "third text still cached");
    }

    #[tokio::test]
    async fn test_provider_preferred_then_fallback() {
        let provider = Arc::new(MockEmbeddingProvider::new(16));
        let engine = EmbeddingEngine::new(Some(provider.clone() as Arc<dyn EmbeddingProvider>));
        assert_eq!(engine.embed("remote vector").await.len(), 16);
        assert_eq!(engine.corpus_size(), 0);

        provider.set_failing(true);
        let v = engine.embed("local vector").await;
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert_eq!(engine.corpus_size(), 1);

        // Only the failed call fell back
        provider.set_failing(false);
        assert_eq!(engine.embed("remote again").await.len(), 16);
    }

    #[tokio::test]
    async fn test_batch_uses_cache_and_falls_back() {
        let provider = Arc::new(MockEmbeddingProvider::failing(16));
        let engine = EmbeddingEngine::new(Some(provider.clone() as Arc<dyn EmbeddingProvider>));
        let texts = vec!["alpha release".to_string(), "beta release".to_string()];

        let first = engine.embed_batch(&texts).await;
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|v| v.len() == EMBEDDING_DIM));
        assert_eq!(provider.call_count(), 1);

        let again = engine.embed_batch(&texts).await;
        assert_eq!(first, again);
        assert_eq!(provider.call_count(), 1, "all hits, no provider call");
    }

    #[tokio::test]
    async fn test_search_similar_top_k_and_min_score() {
        let engine = EmbeddingEngine::default();
        let texts = [
            "server outage caused by expired certificate",
            "renew the certificate before the server expires",
            "team offsite planned for september",
        ];
        let mut candidates = Vec::new();
        for t in texts {
            candidates.push(Candidate {
                id: Uuid::new_v4(),
                vector: engine.embed(t).await,
            });
        }

        let hits = engine
            .search_similar("expired certificate outage", &candidates, 1, 0.0)
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, candidates[0].id);

        let none = engine
            .search_similar("expired certificate outage", &candidates, 10, 1.01)
            .await;
        assert!(none.is_empty());

        let all = engine
            .search_similar("expired certificate outage", &candidates, 10, -1.0)
            .await;
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_long_text_embeds_on_blocking_pool() {
        let engine = EmbeddingEngine::default();
        let long = "throughput latency ".repeat(600);
        assert!(long.chars().count() > BLOCKING_THRESHOLD);
        let v = engine.embed(&long).await;
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn test_byte_codec() {
        let v = vec![1.5f32, -0.25, 0.0];
        let bytes = to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &1.5f32.to_le_bytes());
        assert_eq!(from_bytes(&bytes).unwrap(), v);
        assert!(from_bytes(&[0, 1, 2]).is_err());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
