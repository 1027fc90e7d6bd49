//! Context builder for agent runs

use crate::agents::{Agent, AgentContext, AgentRegistry, Trigger};
use crate::board::{Card, CardService};
use crate::error::BoardError;
use crate::graph::KnowledgeGraph;
use crate::llm::LlmProvider;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

/// Render cards as a numbered list, one card per line.
pub fn format_numbered(cards: &[Card]) -> String {
    cards
        .iter()
        .enumerate()
        .map(|(i, card)| format!("{}. {}", i + 1, card.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the [`AgentContext`] handed to first- and second-pass agents.
pub struct ContextBuilder {
    cards: Arc<CardService>,
    registry: Arc<AgentRegistry>,
    llm: Arc<dyn LlmProvider>,
}

impl ContextBuilder {
    pub fn new(
        cards: Arc<CardService>,
        registry: Arc<AgentRegistry>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            cards,
            registry,
            llm,
        }
    }

    /// Context for a transcript batch.
    pub fn first_pass(
        &self,
        session_id: Uuid,
        round: u64,
        text: String,
        graph: Option<Arc<KnowledgeGraph>>,
    ) -> AgentContext {
        AgentContext {
            session_id,
            round,
            trigger: Trigger::Transcript,
            text,
            llm: self.llm.clone(),
            graph,
        }
    }

    /// Context for a dependent agent: every live card in the columns its
    /// dependencies write to, as a numbered list.
    pub async fn second_pass(
        &self,
        agent: &dyn Agent,
        session_id: Uuid,
        round: u64,
        graph: Option<Arc<KnowledgeGraph>>,
    ) -> Result<AgentContext> {
        let columns = self.dependency_columns(agent)?;
        let cards = self.cards.cards_in_columns(session_id, &columns).await?;
        Ok(AgentContext {
            session_id,
            round,
            trigger: Trigger::Dependencies,
            text: format_numbered(&cards),
            llm: self.llm.clone(),
            graph,
        })
    }

    /// Columns written by the agent's dependencies. A dependency that is no
    /// longer registered is an error.
    fn dependency_columns(&self, agent: &dyn Agent) -> Result<Vec<String>> {
        agent
            .definition()
            .depends_on
            .iter()
            .map(|dep| {
                self.registry
                    .get(dep)
                    .map(|dep| dep.definition().column_id.clone())
                    .ok_or_else(|| anyhow::Error::from(BoardError::UnknownAgent(dep.clone())))
            })
            .collect()
    }
}
