//! Knowledge graph data structures.
//!
//! These types are shared by the in-memory [`KnowledgeGraph`](super::KnowledgeGraph),
//! the persistence collaborator and the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Node & edge types
// ============================================================================

/// Kind of thing a graph node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Concept,
    Entity,
    Topic,
    Claim,
}

impl NodeType {
    /// Lenient parse used for LLM output; unknown values become `Concept`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "entity" | "person" | "organization" | "organisation" | "place" => Self::Entity,
            "topic" => Self::Topic,
            "claim" | "fact" => Self::Claim,
            _ => Self::Concept,
        }
    }
}

/// Arbitrary node attributes.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A node of the session knowledge graph.
///
/// `label` is unique per session, compared case-insensitively after trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub session_id: Uuid,
    pub label: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl GraphNode {
    pub fn new(session_id: Uuid, label: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            label: label.into(),
            node_type,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Lookup key used for label deduplication.
    pub fn label_key(label: &str) -> String {
        label.trim().to_lowercase()
    }
}

/// Ordered `(source, target)` pair identifying an edge.
pub type EdgeKey = (Uuid, Uuid);

/// A directed, weighted relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: Uuid,
    pub session_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relationship: String,
    pub weight: f64,
}

impl GraphEdge {
    pub fn new(
        session_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
        relationship: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            source_id,
            target_id,
            relationship: relationship.into(),
            weight,
        }
    }
}

// ============================================================================
// Batch ingestion input
// ============================================================================

/// An entity extracted from session content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInput {
    pub label: String,
    #[serde(
        rename = "type",
        default = "default_node_type",
        deserialize_with = "lenient_node_type"
    )]
    pub node_type: NodeType,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_node_type() -> NodeType {
    NodeType::Concept
}

fn lenient_node_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeType, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(NodeType::parse_lenient(&raw))
}

/// A relation between two extracted entities, referenced by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationInput {
    pub source: String,
    pub target: String,
    #[serde(alias = "relation", alias = "type")]
    pub relationship: String,
}

/// Outcome of [`KnowledgeGraph::add_entities_and_relations`](super::KnowledgeGraph::add_entities_and_relations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub nodes: usize,
    pub edges: usize,
    pub skipped_relations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_lenient_parse() {
        assert_eq!(NodeType::parse_lenient("Entity"), NodeType::Entity);
        assert_eq!(NodeType::parse_lenient(" person "), NodeType::Entity);
        assert_eq!(NodeType::parse_lenient("topic"), NodeType::Topic);
        assert_eq!(NodeType::parse_lenient("fact"), NodeType::Claim);
        assert_eq!(NodeType::parse_lenient("whatever"), NodeType::Concept);
    }

    #[test]
    fn test_label_key_is_trimmed_lowercase() {
        assert_eq!(GraphNode::label_key("  Acme Corp "), "acme corp");
    }

    #[test]
    fn test_entity_input_defaults() {
        let e: EntityInput = serde_json::from_str(r#"{"label":"Rust"}"#).unwrap();
        assert_eq!(e.node_type, NodeType::Concept);
        assert!(e.metadata.is_empty());

        let e: EntityInput = serde_json::from_str(r#"{"label":"Ada","type":"Person"}"#).unwrap();
        assert_eq!(e.node_type, NodeType::Entity);

        let r: RelationInput =
            serde_json::from_str(r#"{"source":"a","target":"b","relation":"uses"}"#).unwrap();
        assert_eq!(r.relationship, "uses");
    }
}
