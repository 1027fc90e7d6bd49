//! Agent trait and definitions
//!
//! Built-in, prompt-plus-code and user-defined agents all implement
//! [`Agent`]; the pool and the orchestrator never branch on the kind.

use crate::board::CardDraft;
use crate::graph::KnowledgeGraph;
use crate::llm::LlmProvider;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Default completion budget for agents.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Prompt only
    Builtin,
    /// Prompt plus activation/post-processing code
    Scripted,
    /// User-defined prompt
    Custom,
}

/// What a task does when the model returns no output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOutputPolicy {
    /// Complete with zero cards
    #[default]
    Complete,
    /// Fail the task
    Fail,
}

/// Static description of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    /// Column receiving the agent's cards
    pub column_id: String,
    /// Agents that must complete first (in the same round)
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Lower runs first
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub triggers_on_transcript: bool,
    pub kind: AgentKind,
    pub max_tokens: u32,
    #[serde(default)]
    pub null_output: NullOutputPolicy,
}

impl AgentDefinition {
    pub fn new(id: &str, name: &str, column_id: &str, priority: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            column_id: column_id.to_string(),
            depends_on: Vec::new(),
            priority,
            triggers_on_transcript: true,
            kind: AgentKind::Builtin,
            max_tokens: DEFAULT_MAX_TOKENS,
            null_output: NullOutputPolicy::Complete,
        }
    }

    /// Make this a second-pass agent running after `deps`.
    pub fn after(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self.triggers_on_transcript = false;
        self
    }

    pub fn kind(mut self, kind: AgentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_first_pass(&self) -> bool {
        self.depends_on.is_empty() && self.triggers_on_transcript
    }
}

/// What started a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Debounced transcript batch
    Transcript,
    /// Dependencies completed; `text` holds their columns' cards
    Dependencies,
}

/// Everything an agent sees when it runs.
#[derive(Clone)]
pub struct AgentContext {
    pub session_id: Uuid,
    pub round: u64,
    pub trigger: Trigger,
    /// Transcript batch or aggregated dependency-column context
    pub text: String,
    pub llm: Arc<dyn LlmProvider>,
    pub graph: Option<Arc<KnowledgeGraph>>,
}

impl AgentContext {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResult {
    pub cards: Vec<CardDraft>,
}

impl AgentResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn definition(&self) -> &AgentDefinition;

    fn id(&self) -> &str {
        &self.definition().id
    }

    /// Whether the agent has anything to do for this context.
    fn should_activate(&self, ctx: &AgentContext) -> bool {
        !ctx.text.trim().is_empty()
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AgentResult>;
}
