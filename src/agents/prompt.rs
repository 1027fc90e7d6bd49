//! Prompt-driven agents
//!
//! [`PromptAgent`] sends the context text to the model under a system prompt
//! and turns each bullet of the reply into a card. [`ScriptedAgent`] wraps it
//! with an activation rule and an output parser. User-defined agents come
//! from [`CustomAgentConfig`].

use super::traits::{
    Agent, AgentContext, AgentDefinition, AgentKind, AgentResult, NullOutputPolicy,
    DEFAULT_MAX_TOKENS,
};
use crate::board::CardDraft;
use crate::llm::ChatMessage;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Split model output into card contents.
///
/// Each non-empty line is one item; list markers (`-`, `*`, `•`, `1.`, `1)`)
/// and checkbox prefixes are stripped.
pub fn parse_bullets(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_marker(line: &str) -> &str {
    let mut line = line.trim();
    for marker in ["- ", "* ", "• ", "-", "•"] {
        if let Some(rest) = line.strip_prefix(marker) {
            line = rest.trim_start();
            break;
        }
    }
    // Numbered lists
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            line = rest.trim_start();
        }
    }
    for checkbox in ["[ ] ", "[x] ", "[X] "] {
        if let Some(rest) = line.strip_prefix(checkbox) {
            line = rest;
        }
    }
    line.trim()
}

// ============================================================================
// PromptAgent
// ============================================================================

pub struct PromptAgent {
    definition: AgentDefinition,
    system_prompt: String,
}

impl PromptAgent {
    pub fn new(definition: AgentDefinition, system_prompt: impl Into<String>) -> Self {
        Self {
            definition,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run the prompt; `Ok(None)` when the model produced nothing and the
    /// null-output policy allows it.
    pub async fn complete(&self, ctx: &AgentContext) -> Result<Option<String>> {
        let messages = [ChatMessage::user(ctx.text.clone())];
        let output = ctx
            .llm
            .complete(&self.system_prompt, &messages, self.definition.max_tokens)
            .await?;

        match output {
            Some(text) => Ok(Some(text)),
            None => match self.definition.null_output {
                NullOutputPolicy::Complete => {
                    tracing::debug!(agent = %self.definition.id, "Model returned no output");
                    Ok(None)
                }
                NullOutputPolicy::Fail => {
                    anyhow::bail!("agent '{}' received no model output", self.definition.id)
                }
            },
        }
    }
}

#[async_trait]
impl Agent for PromptAgent {
    fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AgentResult> {
        let Some(text) = self.complete(ctx).await? else {
            return Ok(AgentResult::empty());
        };
        Ok(AgentResult {
            cards: parse_bullets(&text).into_iter().map(CardDraft::new).collect(),
        })
    }
}

// ============================================================================
// ScriptedAgent
// ============================================================================

/// Decides whether a scripted agent runs for a context.
pub type ActivationRule = fn(&AgentContext) -> bool;

/// Turns raw model output into card drafts.
pub type OutputParser = fn(&str) -> Vec<CardDraft>;

/// Prompt plus code: custom activation and output parsing around a prompt.
pub struct ScriptedAgent {
    prompt: PromptAgent,
    activation: ActivationRule,
    parser: OutputParser,
}

impl ScriptedAgent {
    pub fn new(
        definition: AgentDefinition,
        system_prompt: impl Into<String>,
        activation: ActivationRule,
        parser: OutputParser,
    ) -> Self {
        Self {
            prompt: PromptAgent::new(definition.kind(AgentKind::Scripted), system_prompt),
            activation,
            parser,
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn definition(&self) -> &AgentDefinition {
        self.prompt.definition()
    }

    fn should_activate(&self, ctx: &AgentContext) -> bool {
        !ctx.text.trim().is_empty() && (self.activation)(ctx)
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AgentResult> {
        let Some(text) = self.prompt.complete(ctx).await? else {
            return Ok(AgentResult::empty());
        };
        Ok(AgentResult {
            cards: (self.parser)(&text),
        })
    }
}

// ============================================================================
// Custom agents
// ============================================================================

/// A user-defined agent, as declared in the YAML config.
///
/// ```yaml
/// agents:
///   - id: risks
///     name: Risks
///     column: insights
///     prompt: "List the risks mentioned, one per line."
///     priority: 25
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAgentConfig {
    pub id: String,
    pub name: String,
    #[serde(alias = "column_id")]
    pub column: String,
    pub prompt: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_custom_priority")]
    pub priority: u32,
    /// Defaults to true for agents without dependencies
    #[serde(default)]
    pub triggers_on_transcript: Option<bool>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub null_output: NullOutputPolicy,
}

fn default_custom_priority() -> u32 {
    100
}

impl CustomAgentConfig {
    pub fn into_agent(self) -> PromptAgent {
        let triggers = self
            .triggers_on_transcript
            .unwrap_or(self.depends_on.is_empty());
        let definition = AgentDefinition {
            id: self.id,
            name: self.name,
            column_id: self.column,
            depends_on: self.depends_on,
            priority: self.priority,
            triggers_on_transcript: triggers,
            kind: AgentKind::Custom,
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            null_output: self.null_output,
        };
        PromptAgent::new(definition, self.prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::traits::Trigger;
    use crate::llm::{LlmProvider, MockLlmProvider, MockReply};
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx(llm: Arc<dyn LlmProvider>, text: &str) -> AgentContext {
        AgentContext {
            session_id: Uuid::new_v4(),
            round: 1,
            trigger: Trigger::Transcript,
            text: text.to_string(),
            llm,
            graph: None,
        }
    }

    #[test]
    fn test_parse_bullets_strips_markers() {
        let out = parse_bullets("- one\n* two\n\n3. three\n4) four\n• five\n- [ ] six\nplain");
        assert_eq!(out, vec!["one", "two", "three", "four", "five", "six", "plain"]);
    }

    #[test]
    fn test_parse_bullets_keeps_leading_numbers_in_text() {
        assert_eq!(parse_bullets("2024 budget approved"), vec!["2024 budget approved"]);
    }

    #[tokio::test]
    async fn test_prompt_agent_cards_from_bullets() {
        let llm = Arc::new(
            MockLlmProvider::new().with_rule("Summarize", MockReply::Text("- a\n- b".into())),
        );
        let agent = PromptAgent::new(
            AgentDefinition::new("summary", "Summary", "summary", 10),
            "Summarize the discussion.",
        );

        let result = agent.execute(&ctx(llm.clone(), "some text")).await.unwrap();
        assert_eq!(result.cards.len(), 2);
        assert_eq!(result.cards[0].content, "a");
        assert_eq!(llm.calls()[0].user, "some text");
    }

    #[tokio::test]
    async fn test_null_output_policy() {
        let llm: Arc<dyn LlmProvider> =
            Arc::new(MockLlmProvider::new().with_rule("", MockReply::Empty));

        let lenient = PromptAgent::new(AgentDefinition::new("a", "A", "summary", 1), "p");
        assert!(lenient.execute(&ctx(llm.clone(), "x")).await.unwrap().cards.is_empty());

        let mut def = AgentDefinition::new("b", "B", "summary", 1);
        def.null_output = NullOutputPolicy::Fail;
        let strict = PromptAgent::new(def, "p");
        assert!(strict.execute(&ctx(llm, "x")).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_agent_hooks() {
        fn long_enough(ctx: &AgentContext) -> bool {
            ctx.word_count() >= 3
        }
        fn shout(text: &str) -> Vec<CardDraft> {
            vec![CardDraft::new(text.to_uppercase())]
        }

        let llm: Arc<dyn LlmProvider> =
            Arc::new(MockLlmProvider::new().with_rule("", MockReply::Text("ok".into())));
        let agent = ScriptedAgent::new(
            AgentDefinition::new("s", "S", "insights", 5),
            "p",
            long_enough,
            shout,
        );

        assert_eq!(agent.definition().kind, AgentKind::Scripted);
        assert!(!agent.should_activate(&ctx(llm.clone(), "too short")));
        let c = ctx(llm, "this is long enough");
        assert!(agent.should_activate(&c));
        assert_eq!(agent.execute(&c).await.unwrap().cards[0].content, "OK");
    }

    #[test]
    fn test_custom_agent_from_yaml() {
        let yaml = r#"
- id: risks
  name: Risks
  column: insights
  prompt: List risks.
- id: digest
  name: Digest
  column: synthesis
  prompt: Digest risks.
  depends_on: [risks]
  priority: 7
"#;
        let configs: Vec<CustomAgentConfig> = serde_yaml::from_str(yaml).unwrap();
        let agents: Vec<PromptAgent> = configs.into_iter().map(|c| c.into_agent()).collect();

        let risks = agents[0].definition();
        assert_eq!(risks.kind, AgentKind::Custom);
        assert_eq!(risks.priority, 100);
        assert!(risks.is_first_pass());

        let digest = agents[1].definition();
        assert_eq!(digest.depends_on, vec!["risks"]);
        assert!(!digest.triggers_on_transcript);
        assert_eq!(digest.priority, 7);
    }
}
