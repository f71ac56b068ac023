//! Resilient in-process task orchestration.
//!
//! Callers register asynchronous task bodies with a [`TaskManager`] and run
//! them singly, in sequence, in concurrency-bounded parallel chunks, or along
//! their dependency graph. Failed attempts are classified into an
//! [`ErrorKind`], retried with backoff when the kind allows it, and finally
//! handed to a fallback (skip, alternative body, human intervention, fail).
//!
//! ```no_run
//! use resilient_core::{EngineConfig, TaskDefinition, TaskManager};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), resilient_core::ExecutorError> {
//! let manager = TaskManager::new(EngineConfig::default())?;
//! let id = manager.register_task(TaskDefinition::from_fn("ping", || async {
//!     Ok(json!("pong"))
//! }))?;
//! let result = manager.execute_task(&id).await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod fallback;
pub mod logging;
pub mod retry;
pub mod state;

pub use classify::{Classification, ErrorClassifier, ErrorPattern, Remediation, RemediationContext};
pub use config::{AppConfig, EngineConfig, LoggingConfig};
pub use error::{ErrorKind, ExecutorError, TaskError, TaskErrorInfo};
pub use events::{EventBus, EventKind, ListenerId, TaskEvent};
pub use executor::{
    task_fn, ManagerState, ManagerStatus, ParallelOptions, Resolution, RunOutcome, RunTarget,
    Task, TaskBody, TaskDefinition, TaskExecutor, TaskManager, TaskResult,
};
pub use fallback::{FallbackHandler, FallbackOutcome, FallbackStrategy};
pub use logging::{ErrorLog, ErrorRecord, LogLevel, LogRecord, LogSink, MemorySink, TracingSink};
pub use retry::{JitterMode, RetryPolicy, RetryStrategy};
pub use state::{BatchState, TaskStatus};
