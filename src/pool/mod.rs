//! Agent execution
//!
//! - [`task`]: `AgentTask` records and their status lifecycle
//! - [`pool`]: `WorkerPool`, the bounded-concurrency priority executor

#[allow(clippy::module_inception)]
pub mod pool;
pub mod task;

pub use pool::{
    clamp_concurrency, WorkerPool, DEFAULT_CONCURRENCY, DEFAULT_TASK_TIMEOUT, MAX_CONCURRENCY,
    MIN_CONCURRENCY,
};
pub use task::{AgentTask, TaskStatus};
