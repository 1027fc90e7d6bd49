//! Persistence collaborator
//!
//! - `BoardStore` trait: async interface for cards, graph records and embeddings
//! - `InMemoryStore`: map-backed implementation used by the CLI and tests

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::BoardStore;
