//! Board Orchestrator - command line
//!
//! Replays a transcript file through the orchestrator and prints the
//! resulting board, or compares texts with the embedding engine.

use anyhow::{Context, Result};
use board_orchestrator::{
    embeddings::{cosine_similarity, EmbeddingEngine},
    llm::{LlmProvider, MockLlmProvider},
    store::InMemoryStore,
    AppState, Config,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "board")]
#[command(about = "Insight board agent orchestrator")]
struct Cli {
    /// Path to the YAML config (defaults to ./board.yaml)
    #[arg(short, long, global = true, env = "BOARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a transcript file (one segment per line) through the agents
    Run {
        /// Transcript file
        #[arg(short, long)]
        transcript: PathBuf,

        /// Use the offline echo model instead of the configured LLM
        #[arg(long)]
        offline: bool,

        /// Pause between segments, in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,

        /// Override the worker pool concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the cosine similarity of two texts
    Embed { a: String, b: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,board_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            transcript,
            offline,
            delay_ms,
            concurrency,
        } => run_transcript(config, &transcript, offline, delay_ms, concurrency).await,
        Commands::Embed { a, b } => run_embed(config, &a, &b).await,
    }
}

async fn run_transcript(
    config: Config,
    path: &std::path::Path,
    offline: bool,
    delay_ms: u64,
    concurrency: Option<usize>,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;

    let llm: Arc<dyn LlmProvider> = match config.llm_provider()? {
        Some(provider) if !offline => Arc::new(provider),
        _ => {
            tracing::info!("Using the offline echo model");
            Arc::new(MockLlmProvider::new())
        }
    };

    let state = AppState::new(config, Arc::new(InMemoryStore::new()), llm);
    let orchestrator = state.orchestrator.clone();
    if let Some(limit) = concurrency {
        orchestrator.set_concurrency(limit);
    }

    let session = orchestrator.start_session(Uuid::new_v4()).await;
    tracing::info!(session_id = %session.id(), "Replaying {}", path.display());

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        orchestrator.add_transcript(line).await?;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
    orchestrator
        .wait_until_idle(Duration::from_millis(100))
        .await;

    // Board dump
    let cards = orchestrator.cards();
    for column in cards.layout().columns() {
        let in_column = cards
            .cards_in_columns(session.id(), std::slice::from_ref(&column.id))
            .await?;
        if in_column.is_empty() {
            continue;
        }
        println!("\n## {}", column.title);
        for card in in_column {
            match &card.source_agent_name {
                Some(agent) => println!("- {} ({})", card.content, agent),
                None => println!("- {}", card.content),
            }
        }
    }

    let tasks = orchestrator.tasks().await;
    let failed: Vec<_> = tasks.iter().filter(|t| t.error.is_some()).collect();
    println!(
        "\n{} agent runs, {} failed; knowledge graph: {} nodes, {} edges",
        tasks.len(),
        failed.len(),
        session.graph().node_count(),
        session.graph().edge_count()
    );
    for task in failed {
        println!("  {} failed: {}", task.agent_key, task.error.as_deref().unwrap_or(""));
    }

    orchestrator.shutdown().await;
    Ok(())
}

async fn run_embed(config: Config, a: &str, b: &str) -> Result<()> {
    let engine = EmbeddingEngine::new(config.embedding_provider());
    let va = engine.embed(a).await;
    let vb = engine.embed(b).await;
    println!("{:.4}", cosine_similarity(&va, &vb));
    Ok(())
}
