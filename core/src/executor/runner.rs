//! Single-attempt execution under a deadline.
//!
//! The body runs on its own tokio task so the orchestrator can stop waiting
//! on it. A deadline or cancellation calls `abort()`, which only lands at the
//! body's next await point; a body that never yields keeps running detached.
//! The deadline timer is dropped on every exit path.

use std::any::Any;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use super::types::TaskBody;
use crate::error::TaskError;

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// The body returned an error, or panicked.
    Failed(TaskError),
    /// The deadline fired first; carries the synthetic timeout error.
    TimedOut(TaskError),
    Cancelled,
}

enum Settled {
    Joined(Result<Result<Value, TaskError>, JoinError>),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskExecutor;

impl TaskExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run one attempt of `body`. `timeout_ms == 0` disables the deadline.
    pub async fn run(
        &self,
        task_name: &str,
        body: &TaskBody,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<Value, AttemptError> {
        if cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }

        let mut handle = tokio::spawn(body());
        let deadline = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));

        let settled = tokio::select! {
            joined = &mut handle => Settled::Joined(joined),
            _ = cancel.cancelled() => Settled::Cancelled,
            _ = wait_deadline(deadline) => Settled::TimedOut,
        };

        match settled {
            Settled::Joined(Ok(Ok(value))) => Ok(value),
            Settled::Joined(Ok(Err(err))) => Err(AttemptError::Failed(err)),
            Settled::Joined(Err(join_err)) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                tracing::error!(task = task_name, %message, "task body panicked");
                Err(AttemptError::Failed(TaskError::named("PanicError", message)))
            }
            Settled::Joined(Err(_)) => Err(AttemptError::Cancelled),
            Settled::TimedOut => {
                handle.abort();
                tracing::warn!(task = task_name, timeout_ms, "attempt deadline exceeded");
                Err(AttemptError::TimedOut(TaskError::timeout(
                    task_name, timeout_ms,
                )))
            }
            Settled::Cancelled => {
                handle.abort();
                tracing::debug!(task = task_name, "attempt abandoned on cancellation");
                Err(AttemptError::Cancelled)
            }
        }
    }
}

async fn wait_deadline(deadline: Option<Duration>) {
    match deadline {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task body panicked".to_string()
    }
}
