//! In-memory implementation of BoardStore.
//!
//! Backs the CLI and the test-suite using `tokio::sync::RwLock<HashMap<K, V>>`
//! collections. Writes can be switched to fail on demand to exercise the
//! best-effort persistence paths.

use crate::board::Card;
use crate::graph::{GraphEdge, GraphNode};
use crate::store::traits::BoardStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory BoardStore.
#[derive(Default)]
pub struct InMemoryStore {
    pub cards: RwLock<HashMap<Uuid, Card>>,
    pub nodes: RwLock<HashMap<Uuid, GraphNode>>,
    pub edges: RwLock<HashMap<Uuid, GraphEdge>>,
    pub embeddings: RwLock<HashMap<Uuid, Vec<u8>>>,
    fail_writes: AtomicBool,
    write_count: AtomicUsize,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (reads keep working).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store unavailable (write rejected)");
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Seed a node without going through the write path.
    pub async fn with_node(self, node: GraphNode) -> Self {
        self.nodes.write().await.insert(node.id, node);
        self
    }

    /// Seed an edge without going through the write path.
    pub async fn with_edge(self, edge: GraphEdge) -> Self {
        self.edges.write().await.insert(edge.id, edge);
        self
    }
}

#[async_trait]
impl BoardStore for InMemoryStore {
    // ========================================================================
    // Cards
    // ========================================================================

    async fn create_card(&self, card: &Card) -> Result<()> {
        self.check_write()?;
        self.cards.write().await.insert(card.id, card.clone());
        Ok(())
    }

    async fn get_card(&self, id: Uuid) -> Result<Option<Card>> {
        Ok(self.cards.read().await.get(&id).cloned())
    }

    async fn update_card(&self, card: &Card) -> Result<()> {
        self.check_write()?;
        let mut cards = self.cards.write().await;
        if !cards.contains_key(&card.id) {
            bail!("card {} not found", card.id);
        }
        cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn delete_card(&self, id: Uuid) -> Result<()> {
        self.check_write()?;
        self.cards.write().await.remove(&id);
        self.embeddings.write().await.remove(&id);
        Ok(())
    }

    async fn list_cards(&self, session_id: Uuid, column_id: Option<&str>) -> Result<Vec<Card>> {
        let cards = self.cards.read().await;
        let mut result: Vec<Card> = cards
            .values()
            .filter(|c| c.session_id == session_id)
            .filter(|c| column_id.map_or(true, |col| c.column_id == col))
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            a.sort_key
                .cmp(&b.sort_key)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(result)
    }

    // ========================================================================
    // Knowledge graph
    // ========================================================================

    async fn get_graph_nodes(&self, session_id: Uuid) -> Result<Vec<GraphNode>> {
        let mut nodes: Vec<GraphNode> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.session_id == session_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.created_at);
        Ok(nodes)
    }

    async fn get_graph_edges(&self, session_id: Uuid) -> Result<Vec<GraphEdge>> {
        Ok(self
            .edges
            .read()
            .await
            .values()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn create_graph_node(&self, node: &GraphNode) -> Result<()> {
        self.check_write()?;
        self.nodes.write().await.insert(node.id, node.clone());
        Ok(())
    }

    async fn update_graph_node(&self, node: &GraphNode) -> Result<()> {
        self.check_write()?;
        self.nodes.write().await.insert(node.id, node.clone());
        Ok(())
    }

    async fn create_graph_edge(&self, edge: &GraphEdge) -> Result<()> {
        self.check_write()?;
        self.edges.write().await.insert(edge.id, edge.clone());
        Ok(())
    }

    async fn update_graph_edge(&self, edge: &GraphEdge) -> Result<()> {
        self.check_write()?;
        self.edges.write().await.insert(edge.id, edge.clone());
        Ok(())
    }

    async fn delete_graph_node(&self, id: Uuid) -> Result<()> {
        self.check_write()?;
        self.nodes.write().await.remove(&id);
        self.edges
            .write()
            .await
            .retain(|_, e| e.source_id != id && e.target_id != id);
        Ok(())
    }

    // ========================================================================
    // Embeddings
    // ========================================================================

    async fn store_embedding(&self, card_id: Uuid, blob: Vec<u8>) -> Result<()> {
        self.check_write()?;
        self.embeddings.write().await.insert(card_id, blob);
        Ok(())
    }

    async fn get_embedding(&self, card_id: Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.embeddings.read().await.get(&card_id).cloned())
    }

    async fn get_embeddings(&self, card_ids: &[Uuid]) -> Result<Vec<(Uuid, Vec<u8>)>> {
        let embeddings = self.embeddings.read().await;
        Ok(card_ids
            .iter()
            .filter_map(|id| embeddings.get(id).map(|blob| (*id, blob.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CardSource;
    use crate::graph::NodeType;

    #[tokio::test]
    async fn test_list_cards_filters_and_orders() {
        let store = InMemoryStore::new();
        let session = Uuid::new_v4();
        let other = Uuid::new_v4();

        let b = Card::new(session, "summary", "b", CardSource::Agent, "b".into());
        let a = Card::new(session, "summary", "a", CardSource::Agent, "a".into());
        let c = Card::new(session, "insights", "c", CardSource::Agent, "V".into());
        let d = Card::new(other, "summary", "d", CardSource::Agent, "V".into());
        for card in [&b, &a, &c, &d] {
            store.create_card(card).await.unwrap();
        }

        let summary = store.list_cards(session, Some("summary")).await.unwrap();
        let contents: Vec<&str> = summary.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);

        assert_eq!(store.list_cards(session, None).await.unwrap().len(), 3);
        assert_eq!(store.write_count(), 4);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = InMemoryStore::new();
        store.set_fail_writes(true);
        let node = GraphNode::new(Uuid::new_v4(), "x", NodeType::Concept);
        assert!(store.create_graph_node(&node).await.is_err());
        assert!(store.nodes.read().await.is_empty());

        store.set_fail_writes(false);
        store.create_graph_node(&node).await.unwrap();
        assert_eq!(store.nodes.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_node_drops_incident_edges() {
        let session = Uuid::new_v4();
        let a = GraphNode::new(session, "a", NodeType::Concept);
        let b = GraphNode::new(session, "b", NodeType::Concept);
        let edge = GraphEdge::new(session, a.id, b.id, "rel", 1.0);
        let store = InMemoryStore::new()
            .with_node(a.clone())
            .await
            .with_node(b.clone())
            .await
            .with_edge(edge)
            .await;

        store.delete_graph_node(a.id).await.unwrap();
        assert_eq!(store.get_graph_nodes(session).await.unwrap().len(), 1);
        assert!(store.get_graph_edges(session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embeddings_roundtrip_and_batch_lookup() {
        let store = InMemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.store_embedding(a, vec![1, 2, 3]).await.unwrap();

        assert_eq!(store.get_embedding(a).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get_embedding(b).await.unwrap(), None);
        let batch = store.get_embeddings(&[a, b]).await.unwrap();
        assert_eq!(batch, vec![(a, vec![1, 2, 3])]);
    }
}
