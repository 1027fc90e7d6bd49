//! Board Orchestrator
//!
//! Agent orchestration core for a live insight board:
//! - Bounded-concurrency worker pool with priority ordering
//! - Two-pass dispatch: transcript-triggered agents, then dependency-gated agents
//! - Deterministic local embeddings with optional delegated providers
//! - Per-session knowledge graph with label deduplication

pub mod agents;
pub mod board;
pub mod embeddings;
pub mod error;
pub mod events;
pub mod graph;
pub mod llm;
pub mod orchestrator;
pub mod pool;
pub mod store;

use agents::{AgentRegistry, CustomAgentConfig};
use anyhow::Result;
use board::{BoardLayout, CardService, Column};
use embeddings::{EmbeddingProvider, HttpEmbeddingProvider};
use events::EventBus;
use llm::{HttpLlmProvider, LlmProvider};
use orchestrator::{BoardServices, Orchestrator, OrchestratorSettings};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use store::BoardStore;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub pool: PoolYamlConfig,
    pub transcript: TranscriptYamlConfig,
    pub llm: LlmYamlConfig,
    pub embeddings: EmbeddingYamlConfig,
    /// Custom column layout; the built-in layout when absent
    pub columns: Option<Vec<Column>>,
    /// User-defined prompt agents
    pub agents: Vec<CustomAgentConfig>,
}

/// Worker pool section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolYamlConfig {
    pub concurrency: usize,
    pub task_timeout_secs: u64,
}

impl Default for PoolYamlConfig {
    fn default() -> Self {
        Self {
            concurrency: pool::DEFAULT_CONCURRENCY,
            task_timeout_secs: pool::DEFAULT_TASK_TIMEOUT.as_secs(),
        }
    }
}

/// Transcript section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptYamlConfig {
    pub debounce_ms: u64,
}

impl Default for TranscriptYamlConfig {
    fn default() -> Self {
        Self {
            debounce_ms: orchestrator::DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

/// LLM provider section (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmYamlConfig {
    pub url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for LlmYamlConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: "llama3.1".into(),
            api_key: None,
        }
    }
}

/// Delegated embedding provider section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingYamlConfig {
    pub url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
}

impl Default for EmbeddingYamlConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: "nomic-embed-text".into(),
            api_key: None,
            dimensions: embeddings::EMBEDDING_DIM,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub concurrency: usize,
    pub debounce_ms: u64,
    pub task_timeout_secs: u64,
    pub llm_url: Option<String>,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub embedding_url: Option<String>,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
    pub embedding_dimensions: usize,
    pub layout: BoardLayout,
    pub custom_agents: Vec<CustomAgentConfig>,
}

/// Read an env var, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.trim().parse().ok())
}

/// URLs set to "disabled" turn a provider off.
fn enabled(url: Option<String>) -> Option<String> {
    url.filter(|u| !u.is_empty() && !u.eq_ignore_ascii_case("disabled"))
}

impl Config {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "board.yaml" in CWD. A missing file means
    /// pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let concurrency = env_parse("BOARD_CONCURRENCY").unwrap_or(yaml.pool.concurrency);

        let mut layout = yaml.columns.map(BoardLayout::new).unwrap_or_default();
        for agent in &yaml.agents {
            layout.ensure_column(&agent.column, &agent.name);
        }

        Ok(Self {
            concurrency: pool::clamp_concurrency(concurrency),
            debounce_ms: env_parse("BOARD_DEBOUNCE_MS").unwrap_or(yaml.transcript.debounce_ms),
            task_timeout_secs: env_parse("BOARD_TASK_TIMEOUT_SECS")
                .unwrap_or(yaml.pool.task_timeout_secs)
                .max(1),
            llm_url: enabled(env_var("LLM_URL").or(yaml.llm.url)),
            llm_model: env_var("LLM_MODEL").unwrap_or(yaml.llm.model),
            llm_api_key: env_var("LLM_API_KEY").or(yaml.llm.api_key),
            embedding_url: enabled(env_var("EMBEDDING_URL").or(yaml.embeddings.url)),
            embedding_model: env_var("EMBEDDING_MODEL").unwrap_or(yaml.embeddings.model),
            embedding_api_key: env_var("EMBEDDING_API_KEY").or(yaml.embeddings.api_key),
            embedding_dimensions: env_parse("EMBEDDING_DIMENSIONS")
                .unwrap_or(yaml.embeddings.dimensions),
            layout,
            custom_agents: yaml.agents,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("board.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            concurrency: self.concurrency,
            debounce: Duration::from_millis(self.debounce_ms),
            task_timeout: Duration::from_secs(self.task_timeout_secs),
        }
    }

    /// The HTTP LLM provider, when an endpoint is configured.
    pub fn llm_provider(&self) -> Result<Option<HttpLlmProvider>> {
        self.llm_url
            .as_ref()
            .map(|url| {
                HttpLlmProvider::new(url.clone(), self.llm_model.clone(), self.llm_api_key.clone())
            })
            .transpose()
    }

    /// The delegated embedding provider, when an endpoint is configured.
    /// Construction failures disable delegation (local embeddings only).
    pub fn embedding_provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        let url = self.embedding_url.as_ref()?;
        match HttpEmbeddingProvider::new(
            url.clone(),
            self.embedding_model.clone(),
            self.embedding_api_key.clone(),
            self.embedding_dimensions,
        ) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                tracing::warn!("Embedding provider disabled: {:#}", e);
                None
            }
        }
    }

    /// Built-in agents plus the custom agents of the config.
    pub fn registry(&self) -> AgentRegistry {
        let registry = AgentRegistry::with_builtins();
        registry.register_custom(&self.custom_agents);
        registry
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the card service, registry, pool and orchestrator around a store
    /// and an LLM provider.
    pub fn new(config: Config, store: Arc<dyn BoardStore>, llm: Arc<dyn LlmProvider>) -> Self {
        let bus = EventBus::default();
        let cards = Arc::new(CardService::new(
            store,
            Arc::new(bus.clone()),
            Arc::new(config.layout.clone()),
        ));
        let services = BoardServices {
            cards,
            bus: bus.clone(),
            registry: Arc::new(config.registry()),
            llm,
            embedding_provider: config.embedding_provider(),
        };
        let orchestrator = Arc::new(Orchestrator::new(services, config.settings()));
        Self {
            bus,
            orchestrator,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
