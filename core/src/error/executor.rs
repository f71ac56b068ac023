use thiserror::Error;

use super::kind::ErrorKind;
use crate::state::TaskStatus;

/// Orchestration errors raised by the task manager.
///
/// A task body failing is *not* one of these: body failures are classified,
/// retried and finally reported through a terminal `TaskResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Dependency not satisfied: task '{task_id}' needs '{dependency}' (status: {status})")]
    DependencyNotSatisfied {
        task_id: String,
        dependency: String,
        status: TaskStatus,
    },

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Task '{task_id}' cannot run from status {status}")]
    InvalidState { task_id: String, status: TaskStatus },

    #[error("Task '{task_id}' failed ({kind}): {message}")]
    TaskFailed {
        task_id: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("Task cancelled: {0}")]
    TaskCancelled(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Join error: {0}")]
    Join(String),
}

impl ExecutorError {
    /// Map an orchestration error onto the task error taxonomy so it can be
    /// logged alongside body failures.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::TaskNotFound(_) | Self::DependencyNotFound { .. } => ErrorKind::ResourceNotFound,
            Self::DuplicateTaskId(_)
            | Self::DependencyNotSatisfied { .. }
            | Self::CircularDependency(_)
            | Self::InvalidState { .. }
            | Self::Config(_) => ErrorKind::Validation,
            Self::TaskFailed { kind, .. } => *kind,
            Self::TaskCancelled(_) | Self::Join(_) => ErrorKind::Unknown,
        }
    }

    /// `execute_task` refused to start this one task; a batch records a slot
    /// for it and carries on.
    pub fn is_unrunnable(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_)
                | Self::InvalidState { .. }
                | Self::DependencyNotFound { .. }
                | Self::DependencyNotSatisfied { .. }
        )
    }

    /// The task was cancelled while it was still queued.
    pub fn is_cancelled_before_start(&self) -> bool {
        matches!(
            self,
            Self::InvalidState {
                status: TaskStatus::Cancelled,
                ..
            }
        )
    }
}
