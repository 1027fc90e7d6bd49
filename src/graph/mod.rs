//! Session knowledge graph.
//!
//! - [`models`]: nodes, edges and extraction inputs
//! - [`store`]: `KnowledgeGraph`, the in-memory graph with label dedup and
//!   asynchronous persistence

pub mod models;
pub mod store;

pub use models::{
    EdgeKey, EntityInput, GraphEdge, GraphNode, IngestSummary, Metadata, NodeType, RelationInput,
};
pub use store::KnowledgeGraph;
