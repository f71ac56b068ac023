use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskErrorInfo;
use crate::state::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Started,
    Completed,
    Failed,
    Retrying,
    Cancelled,
    HumanInterventionRequired,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Created,
        EventKind::Started,
        EventKind::Completed,
        EventKind::Failed,
        EventKind::Retrying,
        EventKind::Cancelled,
        EventKind::HumanInterventionRequired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Started => "started",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::Retrying => "retrying",
            EventKind::Cancelled => "cancelled",
            EventKind::HumanInterventionRequired => "human_intervention_required",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: EventKind,
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskErrorInfo>,
    /// Backoff before the next attempt, set on `Retrying`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl TaskEvent {
    pub fn new(
        kind: EventKind,
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        status: TaskStatus,
        retry_count: u32,
    ) -> Self {
        Self {
            kind,
            task_id: task_id.into(),
            task_name: task_name.into(),
            status,
            retry_count,
            timestamp: Utc::now(),
            error: None,
            delay_ms: None,
        }
    }

    pub fn with_error(mut self, error: TaskErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}
