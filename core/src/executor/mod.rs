//! Task execution and orchestration
//!
//! - Single attempts under a deadline ([`TaskExecutor`])
//! - The attempt loop: execute → classify → remediate → retry → fallback
//! - Sequential batches with halt-on-failure
//! - Chunked parallel batches with index-aligned results and fail-fast
//! - Dependency graph validation and stage-by-stage execution
//! - Cooperative pause/resume/stop at orchestration checkpoints
//!
//! # Architecture
//!
//! ```text
//! TaskDefinition
//!   ↓ register_task()
//! Registry { tasks, running, results }   (one mutex)
//!   ↓ execute_task()
//! prepare → drive ──► TaskExecutor::run (spawned body + deadline)
//!             │  ├─► ErrorClassifier / ErrorLog / Remediation
//!             │  ├─► RetryPolicy + backoff + pre-retry checkpoint
//!             │  └─► FallbackHandler
//!             ↓
//!          settle → TaskResult + EventBus + LogSink + callbacks
//! ```

mod control;
mod graph;
mod manager;
mod runner;
mod scheduler;
pub mod types;

pub use control::{BatchControl, BatchGuard, Checkpoint};
pub use graph::TaskGraph;
pub use manager::{TaskManager, TaskManagerBuilder};
pub use runner::{AttemptError, TaskExecutor};
pub use types::{
    task_fn, ErrorCallback, ManagerState, ManagerStatus, ParallelOptions, Resolution, RunOutcome,
    RunTarget, StatusCounts, SuccessCallback, Task, TaskBody, TaskDefinition, TaskLike, TaskResult,
};
