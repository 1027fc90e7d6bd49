//! Embedding generation module
//!
//! Vector embeddings for cards, used for similarity search over a session.
//!
//! Architecture follows the project pattern (trait + impl + mock):
//! - `EmbeddingProvider` trait: async interface for delegated embedding
//! - `HttpEmbeddingProvider`: any OpenAI-compatible `/v1/embeddings` API
//! - `MockEmbeddingProvider`: deterministic mock for tests
//! - `LocalEmbedder`: dependency-free TF-IDF random projection
//! - `EmbeddingEngine`: provider-first with local fallback and a bounded cache

pub mod engine;
pub mod local;
pub mod mock;
pub mod provider;
pub mod text;
pub mod traits;

pub use engine::{
    cosine_similarity, from_bytes, rank, to_bytes, Candidate, EmbeddingEngine, SimilarityHit,
};
pub use local::{LocalEmbedder, EMBEDDING_DIM};
pub use mock::MockEmbeddingProvider;
pub use provider::HttpEmbeddingProvider;
pub use traits::EmbeddingProvider;
