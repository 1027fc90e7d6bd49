//! BoardStore trait definition
//!
//! Defines the abstract persistence collaborator used by the card service,
//! the knowledge graph and the embedding pipeline. The core never blocks on
//! persistence success: graph and embedding writes are issued from spawned
//! tasks and failures are only logged.

use crate::board::Card;
use crate::graph::{GraphEdge, GraphNode};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Abstract interface for board persistence.
///
/// Implementations must be thread-safe (`Send + Sync`) to be shared
/// across async tasks via `Arc<dyn BoardStore>`.
#[async_trait]
pub trait BoardStore: Send + Sync {
    // ========================================================================
    // Card operations
    // ========================================================================

    /// Persist a new card
    async fn create_card(&self, card: &Card) -> Result<()>;

    /// Get a card by ID
    async fn get_card(&self, id: Uuid) -> Result<Option<Card>>;

    /// Replace a stored card
    async fn update_card(&self, card: &Card) -> Result<()>;

    /// Permanently remove a card (used by empty-trash only)
    async fn delete_card(&self, id: Uuid) -> Result<()>;

    /// List a session's cards, optionally restricted to one column,
    /// ordered by sort key
    async fn list_cards(&self, session_id: Uuid, column_id: Option<&str>) -> Result<Vec<Card>>;

    // ========================================================================
    // Knowledge graph operations
    // ========================================================================

    /// Get all persisted nodes of a session
    async fn get_graph_nodes(&self, session_id: Uuid) -> Result<Vec<GraphNode>>;

    /// Get all persisted edges of a session
    async fn get_graph_edges(&self, session_id: Uuid) -> Result<Vec<GraphEdge>>;

    /// Persist a new node
    async fn create_graph_node(&self, node: &GraphNode) -> Result<()>;

    /// Persist a node whose metadata changed
    async fn update_graph_node(&self, node: &GraphNode) -> Result<()>;

    /// Persist a new edge
    async fn create_graph_edge(&self, edge: &GraphEdge) -> Result<()>;

    /// Persist an edge whose weight changed
    async fn update_graph_edge(&self, edge: &GraphEdge) -> Result<()>;

    /// Delete a node and its incident edges
    async fn delete_graph_node(&self, id: Uuid) -> Result<()>;

    // ========================================================================
    // Embedding operations
    // ========================================================================

    /// Store (or replace) the embedding blob of a card
    async fn store_embedding(&self, card_id: Uuid, blob: Vec<u8>) -> Result<()>;

    /// Get the embedding blob of a card
    async fn get_embedding(&self, card_id: Uuid) -> Result<Option<Vec<u8>>>;

    /// Get the embedding blobs of several cards; cards without one are omitted
    async fn get_embeddings(&self, card_ids: &[Uuid]) -> Result<Vec<(Uuid, Vec<u8>)>>;
}
