//! Orchestrator module for coordinating agents over a board session
//!
//! - [`debouncer`]: quiet-period detection for transcript segments
//! - [`session`]: per-session buffer, round counter and owned graph/embeddings
//! - [`context`]: first- and second-pass agent contexts
//! - [`runner`]: the `Orchestrator` itself

pub mod context;
pub mod debouncer;
pub mod runner;
pub mod session;

pub use context::{format_numbered, ContextBuilder};
pub use debouncer::{QuietHandler, TranscriptDebouncer};
pub use runner::{BoardServices, Orchestrator, OrchestratorSettings, DEFAULT_DEBOUNCE};
pub use session::{Batch, Session, SessionState};
