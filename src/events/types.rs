//! Board event types

use crate::board::Card;
use crate::graph::{GraphEdge, GraphNode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event published on the board event bus.
///
/// Must be Clone for `tokio::sync::broadcast`. The serialized `type` tag uses
/// the `namespace:action` names consumers subscribe to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoardEvent {
    #[serde(rename = "card:created")]
    CardCreated { card: Card },

    #[serde(rename = "card:updated")]
    CardUpdated { card: Card },

    #[serde(rename = "agent:started")]
    AgentStarted {
        task_id: Uuid,
        agent_key: String,
        session_id: Uuid,
    },

    #[serde(rename = "agent:completed")]
    AgentCompleted {
        task_id: Uuid,
        agent_key: String,
        cards_created: usize,
        session_id: Uuid,
        round: u64,
    },

    #[serde(rename = "agent:failed")]
    AgentFailed {
        task_id: Uuid,
        agent_key: String,
        error: String,
        session_id: Uuid,
        round: u64,
    },

    #[serde(rename = "graph:nodeAdded")]
    GraphNodeAdded { node: GraphNode },

    /// Metadata merged into an existing node
    #[serde(rename = "graph:nodeUpdated")]
    GraphNodeUpdated { node: GraphNode },

    #[serde(rename = "graph:edgeAdded")]
    GraphEdgeAdded { edge: GraphEdge },
}

impl BoardEvent {
    /// The `namespace:action` name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CardCreated { .. } => "card:created",
            Self::CardUpdated { .. } => "card:updated",
            Self::AgentStarted { .. } => "agent:started",
            Self::AgentCompleted { .. } => "agent:completed",
            Self::AgentFailed { .. } => "agent:failed",
            Self::GraphNodeAdded { .. } => "graph:nodeAdded",
            Self::GraphNodeUpdated { .. } => "graph:nodeUpdated",
            Self::GraphEdgeAdded { .. } => "graph:edgeAdded",
        }
    }

    /// Session the event belongs to.
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::CardCreated { card } | Self::CardUpdated { card } => card.session_id,
            Self::AgentStarted { session_id, .. }
            | Self::AgentCompleted { session_id, .. }
            | Self::AgentFailed { session_id, .. } => *session_id,
            Self::GraphNodeAdded { node } | Self::GraphNodeUpdated { node } => node.session_id,
            Self::GraphEdgeAdded { edge } => edge.session_id,
        }
    }
}

/// Producer side of the event system.
///
/// Implementations must never block and must tolerate having no listeners.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: BoardEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CardSource;

    #[test]
    fn test_type_tag_names() {
        let event = BoardEvent::AgentCompleted {
            task_id: Uuid::new_v4(),
            agent_key: "summary".into(),
            cards_created: 2,
            session_id: Uuid::new_v4(),
            round: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent:completed");
        assert_eq!(json["cards_created"], 2);
        assert_eq!(event.kind(), "agent:completed");
    }

    #[test]
    fn test_session_id_accessor() {
        let session = Uuid::new_v4();
        let card = Card::new(session, "summary", "text", CardSource::Agent, "V".into());
        let event = BoardEvent::CardCreated { card };
        assert_eq!(event.session_id(), session);

        let json = serde_json::to_string(&event).unwrap();
        let back: BoardEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "card:created");
    }
}
