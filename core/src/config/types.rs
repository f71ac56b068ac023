use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::fallback::FallbackStrategy;
use crate::retry::{JitterMode, RetryStrategy};

/// Top-level config file: `[engine]` and `[logging]` tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine-wide defaults. Per-task settings override these when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    /// Cap for exponential backoff.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    #[serde(default)]
    pub retry_strategy: RetryStrategy,

    #[serde(default)]
    pub jitter: JitterMode,

    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,

    /// Per-attempt deadline; 0 disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// If false, a task routed to human intervention fails instead of waiting.
    #[serde(default = "default_human_approval_needed")]
    pub human_approval_needed: bool,

    /// Default chunk size for parallel batches; unset runs everything in one chunk.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Capacity of the broadcast channel behind `EventBus::subscribe`.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_retry_delay_ms() -> u64 {
    crate::retry::DEFAULT_MAX_DELAY_MS
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_human_approval_needed() -> bool {
    true
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            retry_strategy: RetryStrategy::default(),
            jitter: JitterMode::default(),
            fallback_strategy: FallbackStrategy::default(),
            timeout_ms: default_timeout_ms(),
            human_approval_needed: default_human_approval_needed(),
            max_concurrent: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.max_concurrent == Some(0) {
            return Err(ExecutorError::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(ExecutorError::Config(format!(
                "max_retry_delay_ms ({}) is below base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if self.event_capacity == 0 {
            return Err(ExecutorError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "resilient_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}
