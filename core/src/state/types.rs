use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Registered, not yet started
    Pending,
    /// An attempt is in flight
    Running,
    /// Waiting out a backoff delay before the next attempt
    Retrying,
    /// Held at a retry checkpoint while the batch is paused
    Paused,
    Completed,
    Failed,
    Cancelled,
    /// Retries are exhausted and an operator must resolve the task
    WaitingForHuman,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::WaitingForHuman
        )
    }

    /// Statuses in which a task occupies a slot in the running set.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskStatus::Running | TaskStatus::Retrying | TaskStatus::Paused
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::WaitingForHuman => "waiting_for_human",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch-level control state, toggled by `pause()` / `resume()` / `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Running,
    Paused,
    Stopping,
}
