//! In-memory session knowledge graph.
//!
//! Nodes are deduplicated by trimmed, lowercased label; edges are directed,
//! one per ordered pair, never self loops. Every mutation is applied in
//! memory first, announced on the event bus, then queued for persistence.
//!
//! Persistence runs on a background writer task fed by an mpsc channel (same
//! shape as the debouncer loop), so store writes keep mutation order while
//! callers never wait on them. Write failures are logged and never rolled back.

use super::models::{
    EdgeKey, EntityInput, GraphEdge, GraphNode, IngestSummary, Metadata, NodeType, RelationInput,
};
use crate::events::{BoardEvent, EventEmitter};
use crate::store::BoardStore;
use anyhow::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Weight added when an existing edge is asserted again.
pub const EDGE_REINFORCEMENT: f64 = 0.5;

// ============================================================================
// Persistence queue
// ============================================================================

enum PersistOp {
    CreateNode(GraphNode),
    UpdateNode(GraphNode),
    CreateEdge(GraphEdge),
    UpdateEdge(GraphEdge),
    DeleteNode(Uuid),
    Flush(oneshot::Sender<()>),
}

impl PersistOp {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateNode(_) => "create_graph_node",
            Self::UpdateNode(_) => "update_graph_node",
            Self::CreateEdge(_) => "create_graph_edge",
            Self::UpdateEdge(_) => "update_graph_edge",
            Self::DeleteNode(_) => "delete_graph_node",
            Self::Flush(_) => "flush",
        }
    }
}

async fn run_writer(store: Arc<dyn BoardStore>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        let name = op.name();
        let result = match op {
            PersistOp::CreateNode(node) => store.create_graph_node(&node).await,
            PersistOp::UpdateNode(node) => store.update_graph_node(&node).await,
            PersistOp::CreateEdge(edge) => store.create_graph_edge(&edge).await,
            PersistOp::UpdateEdge(edge) => store.update_graph_edge(&edge).await,
            PersistOp::DeleteNode(id) => store.delete_graph_node(id).await,
            PersistOp::Flush(done) => {
                let _ = done.send(());
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(op = name, "Knowledge graph persistence failed: {:#}", e);
        }
    }
    debug!("Knowledge graph writer stopped");
}

// ============================================================================
// KnowledgeGraph
// ============================================================================

#[derive(Default)]
struct GraphState {
    session_id: Uuid,
    nodes: HashMap<Uuid, GraphNode>,
    by_label: HashMap<String, Uuid>,
    edges: HashMap<EdgeKey, GraphEdge>,
}

impl GraphState {
    fn clear(&mut self) {
        self.nodes.clear();
        self.by_label.clear();
        self.edges.clear();
    }
}

/// Knowledge graph of one session.
///
/// Must be created inside a Tokio runtime (it spawns its writer task).
pub struct KnowledgeGraph {
    state: RwLock<GraphState>,
    store: Arc<dyn BoardStore>,
    events: Arc<dyn EventEmitter>,
    writer: mpsc::UnboundedSender<PersistOp>,
}

impl KnowledgeGraph {
    pub fn new(session_id: Uuid, store: Arc<dyn BoardStore>, events: Arc<dyn EventEmitter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store.clone(), rx));
        Self {
            state: RwLock::new(GraphState {
                session_id,
                ..Default::default()
            }),
            store,
            events,
            writer: tx,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.read().session_id
    }

    /// Replace the in-memory graph with the persisted graph of `session_id`.
    ///
    /// Edges whose endpoints are not among the loaded nodes are skipped.
    pub async fn load_graph(&self, session_id: Uuid) -> Result<()> {
        let nodes = self.store.get_graph_nodes(session_id).await?;
        let edges = self.store.get_graph_edges(session_id).await?;

        let mut state = self.write();
        state.clear();
        state.session_id = session_id;
        for node in nodes {
            state
                .by_label
                .insert(GraphNode::label_key(&node.label), node.id);
            state.nodes.insert(node.id, node);
        }
        let mut skipped = 0usize;
        for edge in edges {
            let valid = edge.source_id != edge.target_id
                && state.nodes.contains_key(&edge.source_id)
                && state.nodes.contains_key(&edge.target_id);
            if valid {
                state.edges.insert((edge.source_id, edge.target_id), edge);
            } else {
                skipped += 1;
            }
        }

        info!(
            session_id = %session_id,
            nodes = state.nodes.len(),
            edges = state.edges.len(),
            skipped_edges = skipped,
            "Knowledge graph loaded"
        );
        Ok(())
    }

    /// Add a node or merge into the node with the same label.
    ///
    /// Returns the id of the new or existing node; `None` for a blank label.
    pub fn add_node(&self, label: &str, node_type: NodeType, metadata: Metadata) -> Option<Uuid> {
        let key = GraphNode::label_key(label);
        if key.is_empty() {
            debug!("Ignoring graph node with blank label");
            return None;
        }

        let mut state = self.write();
        if let Some(&id) = state.by_label.get(&key) {
            if metadata.is_empty() {
                return Some(id);
            }
            let node = state.nodes.get_mut(&id)?;
            node.metadata.extend(metadata);
            let updated = node.clone();
            drop(state);
            debug!(node_id = %id, "Graph node metadata merged");
            self.events.emit(BoardEvent::GraphNodeUpdated {
                node: updated.clone(),
            });
            self.persist(PersistOp::UpdateNode(updated));
            return Some(id);
        }

        let mut node = GraphNode::new(state.session_id, label.trim(), node_type);
        node.metadata = metadata;
        let id = node.id;
        state.by_label.insert(key, id);
        state.nodes.insert(id, node.clone());
        drop(state);

        debug!(node_id = %id, label = %node.label, "Graph node added");
        self.events.emit(BoardEvent::GraphNodeAdded { node: node.clone() });
        self.persist(PersistOp::CreateNode(node));
        Some(id)
    }

    /// Add a directed edge, or reinforce the existing one for this pair.
    ///
    /// No-op (returns `None`) when an endpoint is missing or for a self loop.
    pub fn add_edge(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relationship: &str,
        weight: f64,
    ) -> Option<Uuid> {
        if source_id == target_id {
            return None;
        }
        let mut state = self.write();
        if !state.nodes.contains_key(&source_id) || !state.nodes.contains_key(&target_id) {
            return None;
        }

        let session_id = state.session_id;
        let (edge, created) = match state.edges.entry((source_id, target_id)) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().weight += EDGE_REINFORCEMENT;
                (existing.get().clone(), false)
            }
            Entry::Vacant(slot) => {
                let edge = GraphEdge::new(session_id, source_id, target_id, relationship, weight);
                slot.insert(edge.clone());
                (edge, true)
            }
        };
        drop(state);

        let id = edge.id;
        self.events.emit(BoardEvent::GraphEdgeAdded { edge: edge.clone() });
        if created {
            self.persist(PersistOp::CreateEdge(edge));
        } else {
            self.persist(PersistOp::UpdateEdge(edge));
        }
        Some(id)
    }

    /// Remove a node and its incident edges. Returns whether it existed.
    pub fn remove_node(&self, id: Uuid) -> bool {
        let mut state = self.write();
        let Some(node) = state.nodes.remove(&id) else {
            return false;
        };
        state.by_label.remove(&GraphNode::label_key(&node.label));
        state
            .edges
            .retain(|(src, tgt), _| *src != id && *tgt != id);
        drop(state);

        self.persist(PersistOp::DeleteNode(id));
        true
    }

    /// Batch ingest extracted entities, then the relations between them.
    ///
    /// Relation endpoints are resolved by label against the entities of this
    /// batch; unresolvable relations are skipped.
    pub fn add_entities_and_relations(
        &self,
        entities: &[EntityInput],
        relations: &[RelationInput],
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();
        let mut batch: HashMap<String, Uuid> = HashMap::new();

        for entity in entities {
            if let Some(id) = self.add_node(&entity.label, entity.node_type, entity.metadata.clone())
            {
                batch.insert(GraphNode::label_key(&entity.label), id);
                summary.nodes += 1;
            }
        }

        for relation in relations {
            let source = batch.get(&GraphNode::label_key(&relation.source));
            let target = batch.get(&GraphNode::label_key(&relation.target));
            let added = match (source, target) {
                (Some(&s), Some(&t)) => self.add_edge(s, t, &relation.relationship, 1.0),
                _ => None,
            };
            match added {
                Some(_) => summary.edges += 1,
                None => {
                    debug!(
                        source = %relation.source,
                        target = %relation.target,
                        "Skipping unresolvable relation"
                    );
                    summary.skipped_relations += 1;
                }
            }
        }

        summary
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn node(&self, id: Uuid) -> Option<GraphNode> {
        self.read().nodes.get(&id).cloned()
    }

    pub fn find_by_label(&self, label: &str) -> Option<GraphNode> {
        let state = self.read();
        let id = state.by_label.get(&GraphNode::label_key(label))?;
        state.nodes.get(id).cloned()
    }

    /// All nodes, oldest first.
    pub fn nodes(&self) -> Vec<GraphNode> {
        let mut nodes: Vec<GraphNode> = self.read().nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.created_at);
        nodes
    }

    pub fn edges(&self) -> Vec<GraphEdge> {
        self.read().edges.values().cloned().collect()
    }

    pub fn edge(&self, source_id: Uuid, target_id: Uuid) -> Option<GraphEdge> {
        self.read().edges.get(&(source_id, target_id)).cloned()
    }

    /// Nodes reachable over one outgoing or incoming edge.
    pub fn neighbors(&self, id: Uuid) -> Vec<GraphNode> {
        let state = self.read();
        let mut ids: Vec<Uuid> = state
            .edges
            .keys()
            .filter_map(|(src, tgt)| {
                if *src == id {
                    Some(*tgt)
                } else if *tgt == id {
                    Some(*src)
                } else {
                    None
                }
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids.iter()
            .filter_map(|n| state.nodes.get(n).cloned())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.read().edges.len()
    }

    /// Drop the in-memory graph (persisted data is left alone).
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Wait until every queued store write has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(PersistOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn persist(&self, op: PersistOp) {
        if self.writer.send(op).is_err() {
            warn!("Knowledge graph writer is gone, dropping store write");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}
