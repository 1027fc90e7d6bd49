//! Per-session orchestration state.
//!
//! A [`Session`] owns what lives and dies with one board session: the
//! transcript buffer, the round counter, the agents already dispatched in
//! each unsettled round, the knowledge graph and the embedding engine
//! (whose document-frequency corpus is therefore session-scoped).
//!
//! Rounds may overlap: a new batch can be dispatched while an older round's
//! agents are still running, and each round keeps its own dispatched set
//! until it settles.

use crate::embeddings::EmbeddingEngine;
use crate::graph::KnowledgeGraph;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Where a session is in the transcript → dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing buffered, no round in flight
    Idle,
    /// Segments waiting for the quiet period
    Buffering,
    /// At least one round's agents are queued or running
    Dispatching,
}

/// A transcript batch taken out of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub round: u64,
    pub text: String,
    pub segments: usize,
}

#[derive(Debug, Default)]
struct SessionInner {
    buffer: Vec<String>,
    round: u64,
    /// Unsettled rounds and the agents dispatched in each
    open: BTreeMap<u64, HashSet<String>>,
    closed: bool,
}

pub struct Session {
    id: Uuid,
    graph: Arc<KnowledgeGraph>,
    embeddings: Arc<EmbeddingEngine>,
    cancel: CancellationToken,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(id: Uuid, graph: Arc<KnowledgeGraph>, embeddings: Arc<EmbeddingEngine>) -> Self {
        Self {
            id,
            graph,
            embeddings,
            cancel: CancellationToken::new(),
            inner: Mutex::new(SessionInner::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingEngine> {
        &self.embeddings
    }

    /// Cancelled at teardown; child tokens drive the debouncer and listeners.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> SessionState {
        let inner = self.lock();
        if !inner.buffer.is_empty() {
            SessionState::Buffering
        } else if !inner.open.is_empty() {
            SessionState::Dispatching
        } else {
            SessionState::Idle
        }
    }

    pub fn round(&self) -> u64 {
        self.lock().round
    }

    pub fn buffered_segments(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Append a transcript segment. Returns false once the session is closed.
    pub fn push_segment(&self, text: &str) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.buffer.push(text.to_string());
        true
    }

    /// Drain the buffer into a new round. Older rounds stay open until they
    /// settle.
    pub fn take_batch(&self) -> Option<Batch> {
        let mut inner = self.lock();
        if inner.closed || inner.buffer.is_empty() {
            return None;
        }
        let segments = std::mem::take(&mut inner.buffer);
        inner.round += 1;
        let round = inner.round;
        inner.open.insert(round, HashSet::new());
        Some(Batch {
            round: inner.round,
            segments: segments.len(),
            text: segments.join("\n"),
        })
    }

    /// Record an agent as dispatched in `round`. Returns false when it already
    /// was, or when `round` has settled.
    pub fn claim(&self, round: u64, agent_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        match inner.open.get_mut(&round) {
            Some(dispatched) => dispatched.insert(agent_id.to_string()),
            None => false,
        }
    }

    /// Agents dispatched so far in `round`; empty once it settled.
    pub fn dispatched(&self, round: u64) -> HashSet<String> {
        self.lock().open.get(&round).cloned().unwrap_or_default()
    }

    pub fn is_open(&self, round: u64) -> bool {
        self.lock().open.contains_key(&round)
    }

    /// Unsettled rounds, oldest first.
    pub fn open_rounds(&self) -> Vec<u64> {
        self.lock().open.keys().copied().collect()
    }

    /// The round's work is done.
    pub fn settle(&self, round: u64) {
        self.lock().open.remove(&round);
    }

    /// Stop accepting segments, drop the buffer and cancel the session's
    /// background tasks.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            inner.buffer.clear();
            inner.open.clear();
        }
        self.cancel.cancel();
    }
}
