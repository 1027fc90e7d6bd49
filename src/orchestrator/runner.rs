//! Main orchestrator runner
//!
//! Glues the board to the agents:
//! - transcript segments are buffered and debounced into first-pass rounds
//! - every `agent:completed` re-evaluates which dependent agents of its round
//!   are ready, even when newer rounds have started since
//! - every created or edited card is embedded in the background
//!
//! One session is active at a time; starting a new one tears the previous
//! one down.

use super::context::ContextBuilder;
use super::debouncer::{QuietHandler, TranscriptDebouncer};
use super::session::{Session, SessionState};
use crate::agents::{Agent, AgentContext, AgentRegistry};
use crate::board::{Card, CardService, CardSource, TRANSCRIPT_COLUMN};
use crate::embeddings::{from_bytes, to_bytes, Candidate, EmbeddingEngine, EmbeddingProvider};
use crate::error::BoardError;
use crate::events::{BoardEvent, EventBus};
use crate::graph::KnowledgeGraph;
use crate::llm::LlmProvider;
use crate::pool::{AgentTask, WorkerPool, DEFAULT_CONCURRENCY, DEFAULT_TASK_TIMEOUT};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Silence window before a transcript batch is dispatched.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub concurrency: usize,
    pub debounce: Duration,
    pub task_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            debounce: DEFAULT_DEBOUNCE,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

/// Shared collaborators the orchestrator is built from.
#[derive(Clone)]
pub struct BoardServices {
    pub cards: Arc<CardService>,
    pub bus: EventBus,
    pub registry: Arc<AgentRegistry>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
}

struct Core {
    cards: Arc<CardService>,
    bus: EventBus,
    registry: Arc<AgentRegistry>,
    pool: WorkerPool,
    context: ContextBuilder,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    debounce: Duration,
}

struct ActiveSession {
    session: Arc<Session>,
    debouncer: TranscriptDebouncer,
    listener: JoinHandle<()>,
}

/// Main orchestrator for coordinating agents over a board session
pub struct Orchestrator {
    core: Arc<Core>,
    active: Mutex<Option<ActiveSession>>,
}

impl Orchestrator {
    /// Create a new orchestrator. Registry problems (missing dependencies,
    /// cycles) are logged; the affected agents stay registered but never run.
    pub fn new(services: BoardServices, settings: OrchestratorSettings) -> Self {
        for issue in services.registry.validate() {
            warn!(%issue, "Agent registry issue, affected agents are unreachable");
        }

        let pool = WorkerPool::new(
            services.cards.clone(),
            Arc::new(services.bus.clone()),
            services.registry.clone(),
            settings.concurrency,
            settings.task_timeout,
        );
        let context = ContextBuilder::new(
            services.cards.clone(),
            services.registry.clone(),
            services.llm,
        );

        Self {
            core: Arc::new(Core {
                cards: services.cards,
                bus: services.bus,
                registry: services.registry,
                pool,
                context,
                embedding_provider: services.embedding_provider,
                debounce: settings.debounce,
            }),
            active: Mutex::new(None),
        }
    }

    pub fn cards(&self) -> &Arc<CardService> {
        &self.core.cards
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.core.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.core.pool
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Make `session_id` the active session, tearing down any previous one.
    /// The session's knowledge graph is reloaded from the store.
    pub async fn start_session(&self, session_id: Uuid) -> Arc<Session> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.core.teardown(previous).await;
        }

        let graph = Arc::new(KnowledgeGraph::new(
            session_id,
            self.core.cards.store().clone(),
            Arc::new(self.core.bus.clone()),
        ));
        if let Err(e) = graph.load_graph(session_id).await {
            warn!(session_id = %session_id, "Failed to load knowledge graph: {:#}", e);
        }
        let embeddings = Arc::new(EmbeddingEngine::new(self.core.embedding_provider.clone()));
        let session = Arc::new(Session::new(session_id, graph, embeddings));

        let debouncer = TranscriptDebouncer::new(
            Arc::new(FirstPass {
                core: self.core.clone(),
                session: session.clone(),
            }),
            self.core.debounce,
            session.cancel_token().child_token(),
        );
        // Subscribe before returning so no event of this session is missed
        let rx = self.core.bus.subscribe();
        let listener = tokio::spawn(self.core.clone().listen(session.clone(), rx));

        *active = Some(ActiveSession {
            session: session.clone(),
            debouncer,
            listener,
        });
        info!(session_id = %session_id, "Session started");
        session
    }

    /// Tear down the active session. Returns false when there was none.
    pub async fn end_session(&self) -> bool {
        let previous = self.active.lock().await.take();
        match previous {
            Some(previous) => {
                self.core.teardown(previous).await;
                true
            }
            None => false,
        }
    }

    /// End the session and stop the pool for good.
    pub async fn shutdown(&self) {
        self.end_session().await;
        self.core.pool.shutdown();
    }

    pub async fn session(&self) -> Option<Arc<Session>> {
        self.active.lock().await.as_ref().map(|a| a.session.clone())
    }

    /// State of the active session; `Idle` when there is none.
    pub async fn state(&self) -> SessionState {
        self.session()
            .await
            .map(|s| s.state())
            .unwrap_or(SessionState::Idle)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Append a transcript segment: creates the transcript card, buffers the
    /// text and restarts the quiet-period timer.
    pub async fn add_transcript(&self, text: &str) -> Result<Card> {
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("transcript segment is empty");
        }

        let active = self.active.lock().await;
        let active = active.as_ref().ok_or(BoardError::NoSession)?;
        let card = self
            .core
            .cards
            .create_card(
                active.session.id(),
                TRANSCRIPT_COLUMN,
                text,
                CardSource::Transcript,
                None,
            )
            .await?;
        if active.session.push_segment(&card.content) {
            active.debouncer.trigger();
        }
        Ok(card)
    }

    /// Change the pool's concurrency limit; returns the clamped value.
    pub fn set_concurrency(&self, limit: usize) -> usize {
        self.core.pool.set_concurrency(limit)
    }

    /// Tasks of the active session, in submission order.
    pub async fn tasks(&self) -> Vec<AgentTask> {
        match self.session().await {
            Some(session) => self.core.pool.tasks(session.id()),
            None => Vec::new(),
        }
    }

    /// Live cards of the active session most similar to `text`, best first.
    /// Cards without a stored embedding are not considered.
    pub async fn find_similar_cards(
        &self,
        text: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<(Card, f32)>> {
        let session = self.session().await.ok_or(BoardError::NoSession)?;
        let store = self.core.cards.store();

        let cards: HashMap<Uuid, Card> = store
            .list_cards(session.id(), None)
            .await?
            .into_iter()
            .filter(|c| !c.deleted)
            .map(|c| (c.id, c))
            .collect();
        let ids: Vec<Uuid> = cards.keys().copied().collect();

        let mut candidates = Vec::new();
        for (id, blob) in store.get_embeddings(&ids).await? {
            match from_bytes(&blob) {
                Ok(vector) => candidates.push(Candidate { id, vector }),
                Err(e) => warn!(card_id = %id, "Skipping unreadable embedding: {:#}", e),
            }
        }

        let hits = session
            .embeddings()
            .search_similar(text, &candidates, top_k, min_score)
            .await;
        Ok(hits
            .into_iter()
            .filter_map(|hit| cards.get(&hit.id).map(|c| (c.clone(), hit.score)))
            .collect())
    }

    /// Wait until the active session has nothing buffered and no task queued
    /// or running.
    pub async fn wait_until_idle(&self, poll: Duration) {
        loop {
            let Some(session) = self.session().await else {
                return;
            };
            let busy = self
                .core
                .pool
                .tasks(session.id())
                .iter()
                .any(|t| !t.status.is_terminal());
            if session.state() == SessionState::Idle && !busy {
                return;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Fires the first pass when the transcript goes quiet.
struct FirstPass {
    core: Arc<Core>,
    session: Arc<Session>,
}

#[async_trait]
impl QuietHandler for FirstPass {
    async fn on_quiet(&self) {
        self.core.dispatch_first_pass(&self.session);
    }
}

impl Core {
    fn dispatch_first_pass(&self, session: &Session) -> Vec<Uuid> {
        let Some(batch) = session.take_batch() else {
            return Vec::new();
        };
        let ctx = self.context.first_pass(
            session.id(),
            batch.round,
            batch.text,
            Some(session.graph().clone()),
        );

        let jobs: Vec<(Arc<dyn Agent>, AgentContext)> = self
            .registry
            .first_pass_agents()
            .into_iter()
            .filter(|agent| agent.should_activate(&ctx))
            .filter(|agent| session.claim(batch.round, agent.id()))
            .map(|agent| (agent, ctx.clone()))
            .collect();

        info!(
            session_id = %session.id(),
            round = batch.round,
            segments = batch.segments,
            agents = jobs.len(),
            "Dispatching first pass"
        );
        if jobs.is_empty() {
            session.settle(batch.round);
            return Vec::new();
        }
        self.pool.submit_batch(jobs)
    }

    async fn dispatch_second_pass(&self, session: &Session, round: u64) {
        if !session.is_open(round) {
            return;
        }
        let completed = self.pool.completed_agents(session.id(), round);
        let ready = self
            .registry
            .ready_second_pass(&completed, &session.dispatched(round));

        let mut jobs: Vec<(Arc<dyn Agent>, AgentContext)> = Vec::new();
        for agent in ready {
            let ctx = match self
                .context
                .second_pass(
                    agent.as_ref(),
                    session.id(),
                    round,
                    Some(session.graph().clone()),
                )
                .await
            {
                Ok(ctx) => ctx,
                Err(e) => {
                    warn!(agent = %agent.id(), "Failed to build dependency context: {:#}", e);
                    continue;
                }
            };
            if !agent.should_activate(&ctx) {
                debug!(agent = %agent.id(), round, "Dependent agent declined to activate");
                continue;
            }
            if session.claim(round, agent.id()) {
                jobs.push((agent, ctx));
            }
        }

        if !jobs.is_empty() {
            info!(session_id = %session.id(), round, agents = jobs.len(), "Dispatching second pass");
            self.pool.submit_batch(jobs);
        }
    }

    /// Mark the round done once none of its tasks are queued or running.
    fn settle_if_done(&self, session: &Session, round: u64) {
        let busy = self
            .pool
            .tasks(session.id())
            .iter()
            .any(|t| t.round == round && !t.status.is_terminal());
        if !busy {
            session.settle(round);
        }
    }

    /// Embed a card and persist the vector in the background. Failures are
    /// logged only.
    fn embed_card(&self, session: &Session, card: Card) {
        let engine = session.embeddings().clone();
        let store = self.cards.store().clone();
        tokio::spawn(async move {
            let vector = engine.embed(&card.content).await;
            match store.store_embedding(card.id, to_bytes(&vector)).await {
                Ok(()) => debug!(card_id = %card.id, "Card embedding stored"),
                Err(e) => warn!(card_id = %card.id, "Failed to store card embedding: {:#}", e),
            }
        });
    }

    // ========================================================================
    // Event listener
    // ========================================================================

    async fn listen(self: Arc<Self>, session: Arc<Session>, mut rx: broadcast::Receiver<BoardEvent>) {
        let cancel = session.cancel_token().child_token();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                res = rx.recv() => match res {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Orchestrator listener lagged behind the event bus");
                        self.catch_up(&session).await;
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            if event.session_id() != session.id() {
                continue;
            }

            match event {
                BoardEvent::CardCreated { card } => self.embed_card(&session, card),
                BoardEvent::CardUpdated { card } if !card.deleted => {
                    self.embed_card(&session, card)
                }
                BoardEvent::AgentCompleted { round, .. } => {
                    self.dispatch_second_pass(&session, round).await;
                    self.settle_if_done(&session, round);
                }
                BoardEvent::AgentFailed { round, .. } => self.settle_if_done(&session, round),
                _ => {}
            }
        }
        debug!(session_id = %session.id(), "Orchestrator listener stopped");
    }

    /// Re-evaluate every open round from the pool's task records, for when
    /// completion events were dropped.
    async fn catch_up(&self, session: &Session) {
        for round in session.open_rounds() {
            self.dispatch_second_pass(session, round).await;
            self.settle_if_done(session, round);
        }
    }

    async fn teardown(&self, active: ActiveSession) {
        let session_id = active.session.id();
        active.session.close();
        active.debouncer.cancel();
        if let Err(e) = active.listener.await {
            warn!(session_id = %session_id, "Orchestrator listener ended abnormally: {}", e);
        }

        let cancelled = self.pool.cancel_session(session_id);
        self.pool.clear_session(session_id);
        active.session.graph().flush().await;
        active.session.graph().clear();
        active.session.embeddings().reset();
        info!(session_id = %session_id, cancelled, "Session torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDefinition, PromptAgent};
    use crate::board::BoardLayout;
    use crate::llm::{MockLlmProvider, MockReply};
    use crate::store::InMemoryStore;

    fn orchestrator(registry: AgentRegistry) -> Orchestrator {
        orchestrator_with(registry, MockLlmProvider::new())
    }

    fn orchestrator_with(registry: AgentRegistry, llm: MockLlmProvider) -> Orchestrator {
        let bus = EventBus::default();
        let cards = Arc::new(CardService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(bus.clone()),
            Arc::new(BoardLayout::default()),
        ));
        Orchestrator::new(
            BoardServices {
                cards,
                bus,
                registry: Arc::new(registry),
                llm: Arc::new(llm),
                embedding_provider: None,
            },
            OrchestratorSettings::default(),
        )
    }

    async fn completed(rx: &mut broadcast::Receiver<BoardEvent>, agent: &str) {
        loop {
            match rx.recv().await.unwrap() {
                BoardEvent::AgentCompleted { agent_key, .. } if agent_key == agent => return,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_add_transcript_requires_session() {
        let orch = orchestrator(AgentRegistry::new());
        let err = orch.add_transcript("hello").await.unwrap_err();
        assert_eq!(err.downcast_ref::<BoardError>(), Some(&BoardError::NoSession));
        assert_eq!(orch.state().await, SessionState::Idle);
        assert!(!orch.end_session().await);
    }

    #[tokio::test]
    async fn test_add_transcript_buffers_segment() {
        let orch = orchestrator(AgentRegistry::new());
        let session = orch.start_session(Uuid::new_v4()).await;

        assert!(orch.add_transcript("   ").await.is_err());
        let card = orch.add_transcript("  we should ship friday ").await.unwrap();
        assert_eq!(card.column_id, TRANSCRIPT_COLUMN);
        assert_eq!(card.content, "we should ship friday");
        assert_eq!(card.source, CardSource::Transcript);
        assert_eq!(session.buffered_segments(), 1);
        assert_eq!(orch.state().await, SessionState::Buffering);
    }

    #[tokio::test]
    async fn test_start_session_replaces_previous() {
        let orch = orchestrator(AgentRegistry::new());
        let first = orch.start_session(Uuid::new_v4()).await;
        orch.add_transcript("pending words").await.unwrap();

        let second = orch.start_session(Uuid::new_v4()).await;
        assert!(first.is_closed());
        assert_eq!(first.buffered_segments(), 0);
        assert!(!second.is_closed());
        assert_eq!(orch.session().await.unwrap().id(), second.id());

        assert!(orch.end_session().await);
        assert!(second.is_closed());
        assert!(orch.session().await.is_none());
    }

    #[tokio::test]
    async fn test_set_concurrency_clamps() {
        let orch = orchestrator(AgentRegistry::new());
        assert_eq!(orch.set_concurrency(0), 1);
        assert_eq!(orch.set_concurrency(1000), 99);
        assert_eq!(orch.pool().concurrency(), 99);
    }

    #[tokio::test]
    async fn test_catch_up_recovers_missed_completions() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(PromptAgent::new(
            AgentDefinition::new("facts", "Facts", "summary", 10),
            "Extract facts",
        )));
        registry.register(Arc::new(PromptAgent::new(
            AgentDefinition::new("digest", "Digest", "synthesis", 20).after(&["facts"]),
            "Digest",
        )));
        let llm = MockLlmProvider::new().with_rule("", MockReply::Text("- noted".into()));
        let orch = orchestrator_with(registry, llm);
        let core = &orch.core;

        // A session with no listener: every completion event goes unseen
        let id = Uuid::new_v4();
        let graph = Arc::new(KnowledgeGraph::new(
            id,
            core.cards.store().clone(),
            Arc::new(core.bus.clone()),
        ));
        let session = Session::new(id, graph, Arc::new(EmbeddingEngine::default()));
        let mut rx = core.bus.subscribe();

        session.push_segment("we ship in May");
        assert_eq!(core.dispatch_first_pass(&session).len(), 1);
        completed(&mut rx, "facts").await;
        assert_eq!(core.pool.tasks(id).len(), 1);
        assert_eq!(session.state(), SessionState::Dispatching);

        core.catch_up(&session).await;
        let tasks = core.pool.tasks(id);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].agent_key, "digest");
        assert_eq!(tasks[1].round, 1);

        completed(&mut rx, "digest").await;
        core.catch_up(&session).await;
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.open_rounds().is_empty());
    }
}
