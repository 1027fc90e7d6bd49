//! Bounded-concurrency worker pool for agent tasks.
//!
//! Tasks wait in a priority queue (lower priority value first, FIFO among
//! equals) and start whenever a slot is free. Each running task is a spawned
//! tokio task with its own timeout and cancellation token. Output cards are
//! written through the [`CardService`] before `agent:completed` is emitted,
//! so listeners reacting to completion already see the cards.

use super::task::{AgentTask, TaskStatus};
use crate::agents::{Agent, AgentContext, AgentRegistry, AgentResult};
use crate::board::CardService;
use crate::error::BoardError;
use crate::events::{BoardEvent, EventEmitter};
use anyhow::Result;
use futures::FutureExt;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 99;
pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// Clamp a requested concurrency limit into the supported range.
pub fn clamp_concurrency(limit: usize) -> usize {
    limit.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    priority: u32,
    seq: u64,
    task_id: Uuid,
}

// BinaryHeap is a max-heap: the "greatest" entry has the lowest priority
// value, then the lowest sequence number.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Job {
    agent: Arc<dyn Agent>,
    ctx: AgentContext,
}

struct PoolState {
    limit: usize,
    running: usize,
    next_seq: u64,
    closed: bool,
    queue: BinaryHeap<QueueEntry>,
    jobs: HashMap<Uuid, Job>,
    tasks: HashMap<Uuid, AgentTask>,
    /// Task ids in submission order
    order: Vec<Uuid>,
    cancels: HashMap<Uuid, CancellationToken>,
}

impl PoolState {
    /// Queue a task. A closed pool records it as failed and hands back the
    /// `agent:failed` event to emit once the lock is released.
    fn enqueue(
        &mut self,
        agent: Arc<dyn Agent>,
        ctx: AgentContext,
        priority: u32,
    ) -> (Uuid, Option<BoardEvent>) {
        let mut task = AgentTask::new(agent.id(), ctx.session_id, ctx.round, priority);
        let id = task.id;
        let mut rejected = None;
        if self.closed {
            warn!(agent = %task.agent_key, "Pool is shut down, task rejected");
            if task.fail(BoardError::Cancelled.to_string()).is_ok() {
                rejected = Some(BoardEvent::AgentFailed {
                    task_id: id,
                    agent_key: task.agent_key.clone(),
                    error: BoardError::Cancelled.to_string(),
                    session_id: task.session_id,
                    round: task.round,
                });
            }
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.queue.push(QueueEntry {
                priority,
                seq,
                task_id: id,
            });
            self.jobs.insert(id, Job { agent, ctx });
        }
        self.tasks.insert(id, task);
        self.order.push(id);
        (id, rejected)
    }
}

// ============================================================================
// WorkerPool
// ============================================================================

struct PoolInner {
    state: Mutex<PoolState>,
    cards: Arc<CardService>,
    events: Arc<dyn EventEmitter>,
    registry: Arc<AgentRegistry>,
    task_timeout: Duration,
}

/// Cheaply cloneable handle to the pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(
        cards: Arc<CardService>,
        events: Arc<dyn EventEmitter>,
        registry: Arc<AgentRegistry>,
        concurrency: usize,
        task_timeout: Duration,
    ) -> Self {
        let state = PoolState {
            limit: clamp_concurrency(concurrency),
            running: 0,
            next_seq: 0,
            closed: false,
            queue: BinaryHeap::new(),
            jobs: HashMap::new(),
            tasks: HashMap::new(),
            order: Vec::new(),
            cancels: HashMap::new(),
        };
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(state),
                cards,
                events,
                registry,
                task_timeout,
            }),
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Queue one agent run. Returns immediately with the task id.
    pub fn submit(&self, agent: Arc<dyn Agent>, ctx: AgentContext, priority: u32) -> Uuid {
        let (id, rejected) = self.inner.lock().enqueue(agent, ctx, priority);
        if let Some(event) = rejected {
            self.inner.events.emit(event);
        }
        self.inner.pump();
        id
    }

    /// Queue several runs (each at its agent's priority) before starting any,
    /// so priority order holds across the whole batch.
    pub fn submit_batch(&self, jobs: Vec<(Arc<dyn Agent>, AgentContext)>) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(jobs.len());
        let mut rejected = Vec::new();
        {
            let mut state = self.inner.lock();
            for (agent, ctx) in jobs {
                let priority = agent.definition().priority;
                let (id, event) = state.enqueue(agent, ctx, priority);
                ids.push(id);
                rejected.extend(event);
            }
        }
        for event in rejected {
            self.inner.events.emit(event);
        }
        self.inner.pump();
        ids
    }

    /// Submit every registered agent that wants to run for `ctx`, whose
    /// dependencies already completed in this round and that has no task in
    /// this round yet.
    pub fn submit_all(&self, ctx: &AgentContext) -> Vec<Uuid> {
        let (completed, submitted) = {
            let state = self.inner.lock();
            let mut completed = HashSet::new();
            let mut submitted = HashSet::new();
            for task in state.tasks.values() {
                if task.session_id == ctx.session_id && task.round == ctx.round {
                    submitted.insert(task.agent_key.clone());
                    if task.status == TaskStatus::Completed {
                        completed.insert(task.agent_key.clone());
                    }
                }
            }
            (completed, submitted)
        };

        let jobs: Vec<(Arc<dyn Agent>, AgentContext)> = self
            .inner
            .registry
            .list()
            .into_iter()
            .filter(|agent| {
                let def = agent.definition();
                !submitted.contains(&def.id)
                    && def.depends_on.iter().all(|d| completed.contains(d))
                    && agent.should_activate(ctx)
            })
            .map(|agent| (agent, ctx.clone()))
            .collect();
        self.submit_batch(jobs)
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Change the concurrency limit (clamped to 1..=99). Running tasks are
    /// unaffected; a higher limit starts queued tasks at once.
    pub fn set_concurrency(&self, limit: usize) -> usize {
        let limit = clamp_concurrency(limit);
        self.inner.lock().limit = limit;
        info!(limit, "Worker pool concurrency changed");
        self.inner.pump();
        limit
    }

    pub fn concurrency(&self) -> usize {
        self.inner.lock().limit
    }

    /// Fail the session's pending tasks and abort its running ones.
    /// Returns how many tasks were affected.
    pub fn cancel_session(&self, session_id: Uuid) -> usize {
        let affected = self
            .inner
            .cancel_where(|task| task.session_id == session_id);
        if affected > 0 {
            info!(session_id = %session_id, affected, "Session tasks cancelled");
        }
        affected
    }

    /// Cancel everything and reject further submissions.
    pub fn shutdown(&self) {
        self.inner.lock().closed = true;
        let affected = self.inner.cancel_where(|_| true);
        info!(affected, "Worker pool shut down");
    }

    /// Drop the finished task records of a session.
    pub fn clear_session(&self, session_id: Uuid) {
        let mut state = self.inner.lock();
        state
            .tasks
            .retain(|_, t| t.session_id != session_id || !t.status.is_terminal());
        let PoolState { order, tasks, .. } = &mut *state;
        order.retain(|id| tasks.contains_key(id));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn task(&self, id: Uuid) -> Option<AgentTask> {
        self.inner.lock().tasks.get(&id).cloned()
    }

    /// A session's tasks in submission order.
    pub fn tasks(&self, session_id: Uuid) -> Vec<AgentTask> {
        let state = self.inner.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.inner.lock().running
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    /// Ids of agents that completed in the given session and round.
    pub fn completed_agents(&self, session_id: Uuid, round: u64) -> HashSet<String> {
        self.inner
            .lock()
            .tasks
            .values()
            .filter(|t| {
                t.session_id == session_id && t.round == round && t.status == TaskStatus::Completed
            })
            .map(|t| t.agent_key.clone())
            .collect()
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Start queued tasks while slots are free.
    fn pump(self: &Arc<Self>) {
        loop {
            let (task_id, job, token, session_id) = {
                let mut state = self.lock();
                if state.running >= state.limit {
                    return;
                }
                let Some(entry) = state.queue.pop() else {
                    return;
                };
                // Cancelled while queued
                let Some(job) = state.jobs.remove(&entry.task_id) else {
                    continue;
                };
                let Some(task) = state.tasks.get_mut(&entry.task_id) else {
                    continue;
                };
                if task.start().is_err() {
                    continue;
                }
                let session_id = task.session_id;
                state.running += 1;
                let token = CancellationToken::new();
                state.cancels.insert(entry.task_id, token.clone());
                (entry.task_id, job, token, session_id)
            };

            debug!(task_id = %task_id, agent = %job.agent.id(), "Agent task started");
            self.events.emit(BoardEvent::AgentStarted {
                task_id,
                agent_key: job.agent.id().to_string(),
                session_id,
            });
            tokio::spawn(Arc::clone(self).run(task_id, job, token));
        }
    }

    async fn run(self: Arc<Self>, task_id: Uuid, job: Job, token: CancellationToken) {
        let timeout = self.task_timeout;
        let execution = AssertUnwindSafe(job.agent.execute(&job.ctx)).catch_unwind();

        let outcome: Result<AgentResult> = tokio::select! {
            _ = token.cancelled() => Err(BoardError::Cancelled.into()),
            res = tokio::time::timeout(timeout, execution) => match res {
                Err(_) => Err(BoardError::TaskTimeout(timeout.as_secs()).into()),
                Ok(Err(_)) => Err(anyhow::anyhow!("agent '{}' panicked", job.agent.id())),
                Ok(Ok(result)) => result,
            },
        };

        let outcome = match outcome {
            Ok(result) => Ok(self.write_cards(&job, result).await),
            Err(e) => Err(format!("{:#}", e)),
        };
        self.finish(task_id, job.agent.id(), outcome);
        self.pump();
    }

    /// Place an agent's drafts on the board. Failed writes are logged and
    /// not counted.
    async fn write_cards(&self, job: &Job, result: AgentResult) -> usize {
        let def = job.agent.definition();
        let mut created = 0;
        for draft in &result.cards {
            match self
                .cards
                .create_from_draft(job.ctx.session_id, &def.column_id, draft, &def.name)
                .await
            {
                Ok(_) => created += 1,
                Err(e) => warn!(agent = %def.id, "Failed to write agent card: {:#}", e),
            }
        }
        created
    }

    fn finish(&self, task_id: Uuid, agent_key: &str, outcome: std::result::Result<usize, String>) {
        let event = {
            let mut state = self.lock();
            state.running = state.running.saturating_sub(1);
            state.cancels.remove(&task_id);
            let Some(task) = state.tasks.get_mut(&task_id) else {
                return;
            };
            let (session_id, round) = (task.session_id, task.round);
            match outcome {
                Ok(cards_created) => {
                    if let Err(e) = task.complete(cards_created) {
                        warn!(task_id = %task_id, "{}", e);
                        return;
                    }
                    BoardEvent::AgentCompleted {
                        task_id,
                        agent_key: agent_key.to_string(),
                        cards_created,
                        session_id,
                        round,
                    }
                }
                Err(error) => {
                    if let Err(e) = task.fail(error.clone()) {
                        warn!(task_id = %task_id, "{}", e);
                        return;
                    }
                    BoardEvent::AgentFailed {
                        task_id,
                        agent_key: agent_key.to_string(),
                        error,
                        session_id,
                        round,
                    }
                }
            }
        };

        match &event {
            BoardEvent::AgentFailed { error, .. } => {
                warn!(task_id = %task_id, agent = agent_key, error = %error, "Agent task failed")
            }
            _ => info!(task_id = %task_id, agent = agent_key, "Agent task completed"),
        }
        self.events.emit(event);
    }

    fn cancel_where(&self, matches: impl Fn(&AgentTask) -> bool) -> usize {
        let mut failed = Vec::new();
        let mut affected = 0;
        {
            let mut state = self.lock();
            let PoolState {
                tasks,
                jobs,
                cancels,
                ..
            } = &mut *state;
            for task in tasks.values_mut().filter(|t| matches(&**t)) {
                match task.status {
                    TaskStatus::Pending => {
                        jobs.remove(&task.id);
                        if task.fail(BoardError::Cancelled.to_string()).is_ok() {
                            failed.push(BoardEvent::AgentFailed {
                                task_id: task.id,
                                agent_key: task.agent_key.clone(),
                                error: BoardError::Cancelled.to_string(),
                                session_id: task.session_id,
                                round: task.round,
                            });
                        }
                        affected += 1;
                    }
                    TaskStatus::Running => {
                        if let Some(token) = cancels.get(&task.id) {
                            token.cancel();
                        }
                        affected += 1;
                    }
                    _ => {}
                }
            }
        }
        for event in failed {
            self.events.emit(event);
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDefinition, Trigger};
    use crate::board::{BoardLayout, CardDraft};
    use crate::events::EventBus;
    use crate::llm::MockLlmProvider;
    use crate::store::{BoardStore, InMemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tokio::sync::broadcast;

    struct TestAgent {
        def: AgentDefinition,
        delay: Duration,
        fail: bool,
        drafts: Vec<CardDraft>,
        in_flight: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    impl TestAgent {
        fn new(id: &str, priority: u32) -> Self {
            Self {
                def: AgentDefinition::new(id, id, "summary", priority),
                delay: Duration::from_millis(100),
                fail: false,
                drafts: Vec::new(),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_seen: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Agent for TestAgent {
        fn definition(&self) -> &AgentDefinition {
            &self.def
        }

        async fn execute(&self, _ctx: &AgentContext) -> Result<AgentResult> {
            let now = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.max_seen.fetch_max(now, AtomicOrdering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
            if self.fail {
                anyhow::bail!("agent exploded");
            }
            Ok(AgentResult {
                cards: self.drafts.clone(),
            })
        }
    }

    struct Harness {
        pool: WorkerPool,
        bus: EventBus,
        store: Arc<InMemoryStore>,
        session: Uuid,
    }

    fn harness(concurrency: usize, timeout: Duration) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let bus = EventBus::default();
        let cards = Arc::new(CardService::new(
            store.clone(),
            Arc::new(bus.clone()),
            Arc::new(BoardLayout::default()),
        ));
        let pool = WorkerPool::new(
            cards,
            Arc::new(bus.clone()),
            Arc::new(AgentRegistry::new()),
            concurrency,
            timeout,
        );
        Harness {
            pool,
            bus,
            store,
            session: Uuid::new_v4(),
        }
    }

    fn ctx(session: Uuid) -> AgentContext {
        AgentContext {
            session_id: session,
            round: 1,
            trigger: Trigger::Transcript,
            text: "text".into(),
            llm: Arc::new(MockLlmProvider::new()),
            graph: None,
        }
    }

    /// Collect agent lifecycle events until `n` tasks reached a terminal state.
    async fn wait_terminal(rx: &mut broadcast::Receiver<BoardEvent>, n: usize) -> Vec<BoardEvent> {
        let mut seen = Vec::new();
        let mut terminal = 0;
        while terminal < n {
            let event = rx.recv().await.unwrap();
            match event {
                BoardEvent::AgentCompleted { .. } | BoardEvent::AgentFailed { .. } => {
                    terminal += 1;
                    seen.push(event);
                }
                BoardEvent::AgentStarted { .. } => seen.push(event),
                _ => {}
            }
        }
        seen
    }

    #[test]
    fn test_clamp_concurrency() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(5), 5);
        assert_eq!(clamp_concurrency(500), 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_respected() {
        let h = harness(2, DEFAULT_TASK_TIMEOUT);
        let mut rx = h.bus.subscribe();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let mut agent = TestAgent::new(&format!("a{i}"), 10);
            agent.in_flight = in_flight.clone();
            agent.max_seen = max_seen.clone();
            h.pool.submit(Arc::new(agent), ctx(h.session), 10);
            assert!(h.pool.running_count() <= 2);
        }
        assert_eq!(h.pool.running_count(), 2);
        assert_eq!(h.pool.pending_count(), 3);

        wait_terminal(&mut rx, 5).await;
        assert_eq!(max_seen.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(h.pool.running_count(), 0);
        assert!(h
            .pool
            .tasks(h.session)
            .iter()
            .all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order_with_fifo_ties() {
        let h = harness(1, DEFAULT_TASK_TIMEOUT);
        let mut rx = h.bus.subscribe();

        let batch: Vec<(Arc<dyn Agent>, AgentContext)> = [("late", 30), ("first", 10), ("mid", 20), ("second", 10)]
            .into_iter()
            .map(|(id, p)| (Arc::new(TestAgent::new(id, p)) as Arc<dyn Agent>, ctx(h.session)))
            .collect();
        h.pool.submit_batch(batch);

        let started: Vec<String> = wait_terminal(&mut rx, 4)
            .await
            .into_iter()
            .filter_map(|e| match e {
                BoardEvent::AgentStarted { agent_key, .. } => Some(agent_key),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec!["first", "second", "mid", "late"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated() {
        let h = harness(2, DEFAULT_TASK_TIMEOUT);
        let mut rx = h.bus.subscribe();

        let mut bad = TestAgent::new("bad", 1);
        bad.fail = true;
        let bad_id = h.pool.submit(Arc::new(bad), ctx(h.session), 1);
        let good_id = h
            .pool
            .submit(Arc::new(TestAgent::new("good", 1)), ctx(h.session), 1);

        wait_terminal(&mut rx, 2).await;
        let bad = h.pool.task(bad_id).unwrap();
        assert_eq!(bad.status, TaskStatus::Failed);
        assert!(bad.error.unwrap().contains("agent exploded"));
        assert_eq!(h.pool.task(good_id).unwrap().status, TaskStatus::Completed);
        assert_eq!(
            h.pool.completed_agents(h.session, 1),
            HashSet::from(["good".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_task() {
        let h = harness(1, Duration::from_secs(1));
        let mut rx = h.bus.subscribe();
        let mut slow = TestAgent::new("slow", 1);
        slow.delay = Duration::from_secs(10);
        let id = h.pool.submit(Arc::new(slow), ctx(h.session), 1);

        let events = wait_terminal(&mut rx, 1).await;
        assert!(matches!(events.last(), Some(BoardEvent::AgentFailed { .. })));
        let task = h.pool.task(id).unwrap();
        assert_eq!(task.error.as_deref(), Some("task timed out after 1s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cards_written_before_completion() {
        let h = harness(1, DEFAULT_TASK_TIMEOUT);
        let mut rx = h.bus.subscribe();
        let mut agent = TestAgent::new("writer", 1);
        agent.drafts = vec![CardDraft::new("one"), CardDraft::new("two").in_column("insights")];
        h.pool.submit(Arc::new(agent), ctx(h.session), 1);

        let events = wait_terminal(&mut rx, 1).await;
        match events.last() {
            Some(BoardEvent::AgentCompleted { cards_created, .. }) => assert_eq!(*cards_created, 2),
            other => panic!("unexpected {other:?}"),
        }
        let summary = h.store.list_cards(h.session, Some("summary")).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].source_agent_name.as_deref(), Some("writer"));
        assert_eq!(h.store.list_cards(h.session, Some("insights")).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_session() {
        let h = harness(1, DEFAULT_TASK_TIMEOUT);
        let mut rx = h.bus.subscribe();
        let other = Uuid::new_v4();

        let mut slow = TestAgent::new("running", 1);
        slow.delay = Duration::from_secs(60);
        let running = h.pool.submit(Arc::new(slow), ctx(h.session), 1);
        let queued = h
            .pool
            .submit(Arc::new(TestAgent::new("queued", 2)), ctx(h.session), 2);
        let survivor = h
            .pool
            .submit(Arc::new(TestAgent::new("other", 3)), ctx(other), 3);

        assert_eq!(h.pool.cancel_session(h.session), 2);
        wait_terminal(&mut rx, 3).await;

        for id in [running, queued] {
            let task = h.pool.task(id).unwrap();
            assert_eq!(task.status, TaskStatus::Failed);
            assert_eq!(task.error.as_deref(), Some("task cancelled"));
        }
        assert_eq!(h.pool.task(survivor).unwrap().status, TaskStatus::Completed);

        h.pool.clear_session(h.session);
        assert!(h.pool.tasks(h.session).is_empty());
        assert_eq!(h.pool.tasks(other).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raising_limit_starts_queued_tasks() {
        let h = harness(1, DEFAULT_TASK_TIMEOUT);
        for i in 0..3 {
            h.pool
                .submit(Arc::new(TestAgent::new(&format!("t{i}"), 1)), ctx(h.session), 1);
        }
        assert_eq!(h.pool.running_count(), 1);
        assert_eq!(h.pool.set_concurrency(3), 3);
        assert_eq!(h.pool.running_count(), 3);
        assert_eq!(h.pool.set_concurrency(0), 1);
        // Lowering never stops running tasks
        assert_eq!(h.pool.running_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_all_respects_dependencies() {
        let h = harness(4, DEFAULT_TASK_TIMEOUT);
        let mut rx = h.bus.subscribe();
        let registry = &h.pool.inner.registry;
        registry.register(Arc::new(TestAgent::new("base", 1)));
        let mut dependent = TestAgent::new("dependent", 2);
        dependent.def = dependent.def.clone().after(&["base"]);
        registry.register(Arc::new(dependent));

        let first = h.pool.submit_all(&ctx(h.session));
        assert_eq!(first.len(), 1);
        wait_terminal(&mut rx, 1).await;

        let second = h.pool.submit_all(&ctx(h.session));
        assert_eq!(second.len(), 1);
        assert_eq!(h.pool.task(second[0]).unwrap().agent_key, "dependent");
        // Everything for this round is submitted now
        assert!(h.pool.submit_all(&ctx(h.session)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_work() {
        let h = harness(1, DEFAULT_TASK_TIMEOUT);
        let mut rx = h.bus.subscribe();
        h.pool.shutdown();
        let id = h
            .pool
            .submit(Arc::new(TestAgent::new("late", 1)), ctx(h.session), 1);
        assert_eq!(h.pool.task(id).unwrap().status, TaskStatus::Failed);
        assert_eq!(h.pool.running_count(), 0);

        // Rejected work still reaches observers as a terminal event
        let events = wait_terminal(&mut rx, 1).await;
        match &events[..] {
            [BoardEvent::AgentFailed {
                task_id,
                agent_key,
                error,
                ..
            }] => {
                assert_eq!(*task_id, id);
                assert_eq!(agent_key, "late");
                assert_eq!(error, "task cancelled");
            }
            other => panic!("unexpected events: {other:?}"),
        }

        let ids = h.pool.submit_batch(vec![
            (Arc::new(TestAgent::new("a", 1)) as Arc<dyn Agent>, ctx(h.session)),
            (Arc::new(TestAgent::new("b", 2)) as Arc<dyn Agent>, ctx(h.session)),
        ]);
        let events = wait_terminal(&mut rx, 2).await;
        assert_eq!(events.len(), 2);
        assert!(ids
            .iter()
            .all(|id| h.pool.task(*id).unwrap().status == TaskStatus::Failed));
    }
}
