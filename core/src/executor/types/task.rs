use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{TaskError, TaskErrorInfo};
use crate::fallback::FallbackStrategy;
use crate::retry::{RetryPolicy, RetryStrategy};
use crate::state::TaskStatus;

/// A task body: a no-argument async operation, callable once per attempt.
pub type TaskBody = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, TaskError>> + Send + Sync>;

pub type SuccessCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&TaskErrorInfo) + Send + Sync>;

/// Wrap an async closure as a [`TaskBody`].
pub fn task_fn<F, Fut>(f: F) -> TaskBody
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Common task interface for dependency graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// What a caller registers. Unset knobs fall back to the engine config.
#[derive(Clone)]
pub struct TaskDefinition {
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) body: TaskBody,
    pub(crate) dependencies: Vec<String>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) retry_delay_ms: Option<u64>,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) retry_strategy: Option<RetryStrategy>,
    pub(crate) fallback: Option<FallbackStrategy>,
    pub(crate) continue_on_failure: bool,
    pub(crate) alternative: Option<TaskBody>,
    pub(crate) on_success: Option<SuccessCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, body: TaskBody) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            body,
            dependencies: Vec::new(),
            max_retries: None,
            retry_delay_ms: None,
            timeout_ms: None,
            retry_strategy: None,
            fallback: None,
            continue_on_failure: true,
            alternative: None,
            on_success: None,
            on_error: None,
        }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self::new(name, task_fn(f))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = Some(delay_ms);
        self
    }

    /// Per-attempt deadline; 0 disables it.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// When false, a failure of this task halts the rest of a sequence.
    pub fn continue_on_failure(mut self, value: bool) -> Self {
        self.continue_on_failure = value;
        self
    }

    /// Body run in place of this one by the `AlternativeTask` fallback.
    pub fn with_alternative(mut self, alternative: TaskBody) -> Self {
        self.alternative = Some(alternative);
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskErrorInfo) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("max_retries", &self.max_retries)
            .field("timeout_ms", &self.timeout_ms)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Registry view of a task: its resolved settings plus runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub retry_strategy: RetryStrategy,
    pub fallback: FallbackStrategy,
    pub continue_on_failure: bool,
    pub has_alternative: bool,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    pub(crate) fn from_definition(id: String, def: &TaskDefinition, cfg: &EngineConfig) -> Self {
        Self {
            id,
            name: def.name.clone(),
            description: def.description.clone(),
            dependencies: def.dependencies.clone(),
            max_retries: def.max_retries.unwrap_or(cfg.max_retries),
            retry_delay_ms: def.retry_delay_ms.unwrap_or(cfg.base_retry_delay_ms),
            timeout_ms: def.timeout_ms.unwrap_or(cfg.timeout_ms),
            retry_strategy: def.retry_strategy.unwrap_or(cfg.retry_strategy),
            fallback: def.fallback.unwrap_or(cfg.fallback_strategy),
            continue_on_failure: def.continue_on_failure,
            has_alternative: def.alternative.is_some(),
            status: TaskStatus::Pending,
            retry_count: 0,
            start_time: None,
            end_time: None,
        }
    }

    /// Retry policy for this task: its own knobs over the engine's cap and jitter.
    pub fn retry_policy(&self, cfg: &EngineConfig) -> RetryPolicy {
        RetryPolicy {
            strategy: self.retry_strategy,
            base_delay_ms: self.retry_delay_ms,
            max_delay_ms: cfg.max_retry_delay_ms.max(self.retry_delay_ms),
            max_retries: self.max_retries,
            jitter: cfg.jitter,
        }
    }
}

impl TaskLike for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}
