use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::kind::ErrorKind;

/// Error raised by a task body.
///
/// Bodies are opaque to the engine; all it inspects is the `name` and the
/// `message`, which the classifier matches against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Synthetic error used when an attempt outlives its deadline.
    pub fn timeout(task_name: &str, timeout_ms: u64) -> Self {
        Self::named(
            "TimeoutError",
            format!("task '{task_name}' timed out after {timeout_ms}ms"),
        )
    }

    pub fn into_info(self, kind: ErrorKind) -> TaskErrorInfo {
        TaskErrorInfo {
            kind,
            name: self.name,
            message: self.message,
            stack: self.stack,
        }
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        Self::named("IoError", err.to_string())
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        let stack = err
            .chain()
            .skip(1)
            .map(|cause| cause.to_string())
            .collect::<Vec<_>>();
        Self {
            name: "Error".to_string(),
            message: err.to_string(),
            stack: (!stack.is_empty()).then(|| stack.join("\ncaused by: ")),
        }
    }
}

/// Structured error attached to a terminal [`TaskResult`](crate::executor::TaskResult).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskErrorInfo {
    pub kind: ErrorKind,
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_os_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory");
        let err = TaskError::from(io);
        assert_eq!(err.name, "IoError");
        assert!(err.message.contains("no such file"));
    }

    #[test]
    fn test_anyhow_context_becomes_stack() {
        let err = anyhow::anyhow!("connection reset").context("fetching inbox");
        let err = TaskError::from(err);
        assert_eq!(err.message, "fetching inbox");
        assert_eq!(err.stack.as_deref(), Some("connection reset"));
    }
}
