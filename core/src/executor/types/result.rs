use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskErrorInfo;
use crate::state::TaskStatus;

/// Terminal outcome of one task execution. Exactly one is recorded per
/// execution, however many attempts it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub task_name: String,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskErrorInfo>,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub status: TaskStatus,

    /// Failed slot produced by the `Skip` fallback; never halts a sequence.
    #[serde(default)]
    pub skipped: bool,

    /// The value came from the alternative body, not the original.
    #[serde(default)]
    pub alternative_used: bool,

    /// Error a remediation handler or alternative recovered from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled_error: Option<TaskErrorInfo>,
}

impl TaskResult {
    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    /// A failure that should stop a sequence or trip fail-fast.
    pub fn is_hard_failure(&self) -> bool {
        self.is_failed() && !self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_serialized_shape() {
        let now = Utc::now();
        let result = TaskResult {
            task_id: "t1".into(),
            task_name: "fetch".into(),
            success: false,
            result: None,
            error: Some(TaskErrorInfo {
                kind: ErrorKind::Network,
                name: "Error".into(),
                message: "ECONNRESET".into(),
                stack: None,
            }),
            start_time: now,
            end_time: now,
            duration_ms: 0,
            retry_count: 3,
            status: TaskStatus::Failed,
            skipped: true,
            alternative_used: false,
            handled_error: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["error"]["kind"], "NETWORK");
        assert!(json.get("result").is_none());
        assert!(result.is_failed());
        assert!(!result.is_hard_failure());
    }
}
