//! Agents: the units of work the pool runs.
//!
//! - [`traits`]: `Agent`, `AgentDefinition`, `AgentContext`, `AgentResult`
//! - [`prompt`]: prompt-only, prompt-plus-code and custom agents
//! - [`builtin`]: the built-in catalog
//! - [`registry`]: `AgentRegistry`, lookups, readiness and validation

pub mod builtin;
pub mod prompt;
pub mod registry;
pub mod traits;

pub use prompt::{parse_bullets, CustomAgentConfig, PromptAgent, ScriptedAgent};
pub use registry::{AgentRegistry, RegistryIssue};
pub use traits::{
    Agent, AgentContext, AgentDefinition, AgentKind, AgentResult, NullOutputPolicy, Trigger,
};
