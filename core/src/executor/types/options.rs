use serde::{Deserialize, Serialize};

use super::result::TaskResult;
use crate::state::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelOptions {
    /// Chunk size; `None` uses the engine default, and without one the
    /// whole batch runs as a single chunk.
    pub max_concurrent: Option<usize>,
    /// Abort the batch on the first hard failure.
    pub fail_fast: bool,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            fail_fast: true,
        }
    }
}

impl ParallelOptions {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: Some(max_concurrent),
            ..Self::default()
        }
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// What `TaskManager::run` should execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Task(String),
    Sequence(Vec<String>),
    Parallel(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Single(TaskResult),
    Sequence(Vec<TaskResult>),
    /// Index-aligned with the input; `None` for tasks that never produced a result.
    Parallel(Vec<Option<TaskResult>>),
}

impl RunOutcome {
    pub fn results(&self) -> Vec<&TaskResult> {
        match self {
            RunOutcome::Single(r) => vec![r],
            RunOutcome::Sequence(rs) => rs.iter().collect(),
            RunOutcome::Parallel(rs) => rs.iter().flatten().collect(),
        }
    }
}

/// Decision an operator hands back for a task in WAITING_FOR_HUMAN.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Complete(serde_json::Value),
    Fail(String),
    /// Back to PENDING with a fresh retry budget.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Running,
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub retrying: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub waiting_for_human: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: TaskStatus) {
        let slot = match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Running => &mut self.running,
            TaskStatus::Retrying => &mut self.retrying,
            TaskStatus::Paused => &mut self.paused,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Cancelled => &mut self.cancelled,
            TaskStatus::WaitingForHuman => &mut self.waiting_for_human,
        };
        *slot += 1;
    }
}

/// Point-in-time progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub state: ManagerState,
    pub total: usize,
    pub counts: StatusCounts,
    pub running_tasks: Vec<String>,
    pub results: usize,
}
