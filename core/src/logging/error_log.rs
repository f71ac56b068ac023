use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ErrorKind;

/// One failed attempt as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub kind: ErrorKind,
    /// Key of the pattern that matched, `unknown` when none did.
    pub pattern: String,
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub context: Value,
    pub resolved: bool,
    pub resolution: Option<String>,
}

#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        task_id: &str,
        kind: ErrorKind,
        pattern: &str,
        name: &str,
        message: &str,
        stack: Option<&str>,
        context: Value,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let record = ErrorRecord {
            id: id.clone(),
            timestamp: Utc::now(),
            task_id: task_id.to_string(),
            kind,
            pattern: pattern.to_string(),
            name: name.to_string(),
            message: message.to_string(),
            stack: stack.map(str::to_string),
            context,
            resolved: false,
            resolution: None,
        };
        self.lock().push(record);
        id
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.lock().clone()
    }

    pub fn records_for_task(&self, task_id: &str) -> Vec<ErrorRecord> {
        self.lock()
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn count_by_kind(&self, kind: ErrorKind) -> usize {
        self.lock().iter().filter(|r| r.kind == kind).count()
    }

    pub fn count_by_pattern(&self, pattern: &str) -> usize {
        self.lock().iter().filter(|r| r.pattern == pattern).count()
    }

    /// Per-kind histogram of everything recorded so far.
    pub fn kind_histogram(&self) -> HashMap<ErrorKind, usize> {
        let mut counts = HashMap::new();
        for record in self.lock().iter() {
            *counts.entry(record.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns false when no record carries `id`.
    pub fn mark_resolved(&self, id: &str, resolution: impl Into<String>) -> bool {
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.resolved = true;
                record.resolution = Some(resolution.into());
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ErrorRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}
