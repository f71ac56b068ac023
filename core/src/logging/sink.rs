use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Destination for the engine's structured lifecycle messages.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, metadata: &Value);

    fn debug(&self, message: &str, metadata: &Value) {
        self.log(LogLevel::Debug, message, metadata);
    }

    fn info(&self, message: &str, metadata: &Value) {
        self.log(LogLevel::Info, message, metadata);
    }

    fn warn(&self, message: &str, metadata: &Value) {
        self.log(LogLevel::Warn, message, metadata);
    }

    fn error(&self, message: &str, metadata: &Value) {
        self.log(LogLevel::Error, message, metadata);
    }
}

/// Forwards to `tracing` under the `resilient` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str, metadata: &Value) {
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "resilient", metadata = %metadata, "{message}")
            }
            LogLevel::Info => {
                tracing::info!(target: "resilient", metadata = %metadata, "{message}")
            }
            LogLevel::Warn => {
                tracing::warn!(target: "resilient", metadata = %metadata, "{message}")
            }
            LogLevel::Error => {
                tracing::error!(target: "resilient", metadata = %metadata, "{message}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub metadata: Value,
}

/// Keeps every record in memory; mostly for tests and the demo CLI.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str, metadata: &Value) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LogRecord {
                timestamp: Utc::now(),
                level,
                message: message.to_string(),
                metadata: metadata.clone(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_sink_keeps_order_and_levels() {
        let sink = MemorySink::new();
        sink.info("task started", &json!({"task_id": "a"}));
        sink.warn("task retrying", &json!({"delay_ms": 100}));
        sink.error("task failed", &Value::Null);

        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].level, LogLevel::Warn);
        assert_eq!(records[1].metadata["delay_ms"], 100);
        assert_eq!(sink.messages(LogLevel::Error), vec!["task failed"]);

        sink.clear();
        assert!(sink.records().is_empty());
    }
}
