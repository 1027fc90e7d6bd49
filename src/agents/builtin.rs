//! Built-in agent catalog

use super::prompt::{parse_bullets, PromptAgent, ScriptedAgent};
use super::traits::{Agent, AgentContext, AgentDefinition, AgentKind, AgentResult};
use crate::board::CardDraft;
use crate::graph::{EntityInput, RelationInput};
use crate::llm::ChatMessage;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const SUMMARY: &str = "summary";
pub const INSIGHTS: &str = "insights";
pub const QUESTIONS: &str = "questions";
pub const ACTION_ITEMS: &str = "action_items";
pub const KNOWLEDGE_GRAPH: &str = "knowledge_graph";
pub const SYNTHESIS: &str = "synthesis";
pub const FOLLOW_UPS: &str = "follow_ups";

/// Minimum words before the questions agent bothers the model.
const QUESTIONS_MIN_WORDS: usize = 12;

const ACTION_CUES: &[&str] = &[
    "will ", "need to", "needs to", "should", "must", "todo", "to do", "action", "follow up",
    "deadline", "by monday", "by friday", "by tomorrow", "next week", "assign", "take care of",
];

/// Every built-in agent.
pub fn catalog() -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(summary()),
        Arc::new(insights()),
        Arc::new(questions()),
        Arc::new(action_items()),
        Arc::new(GraphExtractionAgent::new()),
        Arc::new(synthesis()),
        Arc::new(follow_ups()),
    ]
}

pub fn summary() -> PromptAgent {
    PromptAgent::new(
        AgentDefinition::new(SUMMARY, "Summary", "summary", 10),
        "You summarize live meeting transcripts. Reply with 1 to 3 short bullet \
         points capturing what was said. No preamble.",
    )
}

pub fn insights() -> PromptAgent {
    PromptAgent::new(
        AgentDefinition::new(INSIGHTS, "Insights", "insights", 20),
        "You extract non-obvious insights from meeting transcripts: decisions, \
         risks, disagreements, surprising facts. One bullet per insight, at most 3. \
         Reply with nothing if there is nothing notable.",
    )
}

pub fn questions() -> ScriptedAgent {
    ScriptedAgent::new(
        AgentDefinition::new(QUESTIONS, "Questions", "questions", 30),
        "You list open questions raised or implied by a meeting transcript. \
         One question per line, each ending with a question mark.",
        |ctx| ctx.word_count() >= QUESTIONS_MIN_WORDS,
        extract_questions,
    )
}

pub fn action_items() -> ScriptedAgent {
    ScriptedAgent::new(
        AgentDefinition::new(ACTION_ITEMS, "Action Items", "actions", 40),
        "You extract action items from a meeting transcript. One per line, \
         formatted as `owner: task` when an owner is known.",
        has_action_cue,
        extract_actions,
    )
}

pub fn synthesis() -> PromptAgent {
    PromptAgent::new(
        AgentDefinition::new(SYNTHESIS, "Synthesis", "synthesis", 60).after(&[SUMMARY, INSIGHTS]),
        "You are given the current summary and insight cards of a meeting board. \
         Write 1 or 2 bullets that connect them into a higher-level takeaway.",
    )
}

pub fn follow_ups() -> PromptAgent {
    PromptAgent::new(
        AgentDefinition::new(FOLLOW_UPS, "Follow-ups", "follow_ups", 70)
            .after(&[QUESTIONS, ACTION_ITEMS]),
        "You are given open questions and action items from a meeting board. \
         Propose concrete follow-ups, one per line.",
    )
}

fn extract_questions(text: &str) -> Vec<CardDraft> {
    parse_bullets(text)
        .into_iter()
        .filter(|line| line.ends_with('?'))
        .map(CardDraft::new)
        .collect()
}

fn has_action_cue(ctx: &AgentContext) -> bool {
    let lowered = ctx.text.to_lowercase();
    ACTION_CUES.iter().any(|cue| lowered.contains(cue))
}

fn extract_actions(text: &str) -> Vec<CardDraft> {
    parse_bullets(text)
        .into_iter()
        .map(|line| {
            let line = line
                .strip_prefix("TODO:")
                .or_else(|| line.strip_prefix("Action:"))
                .map(|rest| rest.trim().to_string())
                .unwrap_or(line);
            let owner = line
                .split_once(": ")
                .map(|(owner, _)| owner.trim().to_lowercase())
                .filter(|owner| !owner.is_empty() && owner.split_whitespace().count() <= 3);
            match owner {
                Some(owner) => CardDraft::new(line).with_tag(format!("owner:{owner}")),
                None => CardDraft::new(line),
            }
        })
        .collect()
}

// ============================================================================
// Knowledge graph extraction
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct Extraction {
    #[serde(default)]
    entities: Vec<EntityInput>,
    #[serde(default)]
    relations: Vec<RelationInput>,
}

/// Pull the first JSON object out of model output (tolerates code fences
/// and surrounding prose).
fn parse_extraction(text: &str) -> Option<Extraction> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Extracts entities and relations into the session knowledge graph.
/// Produces no cards.
pub struct GraphExtractionAgent {
    definition: AgentDefinition,
}

impl GraphExtractionAgent {
    const SYSTEM_PROMPT: &'static str = "You build a knowledge graph from meeting transcripts. \
        Reply with JSON only: {\"entities\": [{\"label\": str, \"type\": \
        \"concept\"|\"entity\"|\"topic\"|\"claim\"}], \"relations\": [{\"source\": str, \
        \"target\": str, \"relationship\": str}]}. Relations may only reference listed entities.";

    pub fn new() -> Self {
        Self {
            definition: AgentDefinition::new(KNOWLEDGE_GRAPH, "Knowledge Graph", "knowledge_graph", 50)
                .kind(AgentKind::Scripted),
        }
    }
}

impl Default for GraphExtractionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for GraphExtractionAgent {
    fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    fn should_activate(&self, ctx: &AgentContext) -> bool {
        ctx.graph.is_some() && !ctx.text.trim().is_empty()
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AgentResult> {
        let Some(graph) = &ctx.graph else {
            return Ok(AgentResult::empty());
        };
        let messages = [ChatMessage::user(ctx.text.clone())];
        let Some(output) = ctx
            .llm
            .complete(Self::SYSTEM_PROMPT, &messages, self.definition.max_tokens)
            .await?
        else {
            return Ok(AgentResult::empty());
        };

        let Some(extraction) = parse_extraction(&output) else {
            tracing::warn!(
                session_id = %ctx.session_id,
                "Knowledge graph extraction returned no parseable JSON"
            );
            return Ok(AgentResult::empty());
        };

        let summary = graph.add_entities_and_relations(&extraction.entities, &extraction.relations);
        tracing::debug!(
            session_id = %ctx.session_id,
            nodes = summary.nodes,
            edges = summary.edges,
            skipped = summary.skipped_relations,
            "Knowledge graph updated"
        );
        Ok(AgentResult::empty())
    }
}
