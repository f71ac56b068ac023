use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::{ErrorClassifier, ErrorPattern, RemediationContext};
use crate::config::EngineConfig;
use crate::error::{ErrorKind, ExecutorError, TaskError, TaskErrorInfo};
use crate::events::{EventBus, EventKind, ListenerId, TaskEvent};
use crate::fallback::{FallbackHandler, FallbackOutcome, FallbackRequest, FallbackStrategy};
use crate::logging::{ErrorLog, LogSink, TracingSink};
use crate::retry::RetryPolicy;
use crate::state::{BatchState, StatusTransition, TaskStatus};

use super::control::{BatchControl, Checkpoint};
use super::graph::TaskGraph;
use super::runner::{AttemptError, TaskExecutor};
use super::scheduler::{chunk_ranges, run_chunk};
use super::types::{
    ErrorCallback, ManagerState, ManagerStatus, ParallelOptions, Resolution, RunOutcome,
    RunTarget, StatusCounts, SuccessCallback, Task, TaskBody, TaskDefinition, TaskResult,
};

struct TaskEntry {
    task: Task,
    body: TaskBody,
    alternative: Option<TaskBody>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    cancel: CancellationToken,
}

/// Everything `pause`/`cancel_task`/`get_status` may touch from outside a
/// running batch lives behind one mutex.
#[derive(Default)]
struct Registry {
    tasks: HashMap<String, TaskEntry>,
    order: Vec<String>,
    running: HashSet<String>,
    results: Vec<TaskResult>,
}

struct Inner {
    config: EngineConfig,
    registry: Mutex<Registry>,
    classifier: RwLock<ErrorClassifier>,
    events: EventBus,
    control: BatchControl,
    executor: TaskExecutor,
    fallback: FallbackHandler,
    logger: Arc<dyn LogSink>,
    error_log: Arc<ErrorLog>,
}

/// Per-execution copy of what the attempt loop needs, taken once so the
/// registry lock is never held across an await.
struct Prepared {
    id: String,
    name: String,
    body: TaskBody,
    alternative: Option<TaskBody>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    cancel: CancellationToken,
    policy: RetryPolicy,
    timeout_ms: u64,
    fallback: FallbackStrategy,
    start_time: DateTime<Utc>,
}

struct Outcome {
    status: TaskStatus,
    value: Option<Value>,
    error: Option<TaskErrorInfo>,
    skipped: bool,
    alternative_used: bool,
    handled_error: Option<TaskErrorInfo>,
}

impl Outcome {
    fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            value: None,
            error: None,
            skipped: false,
            alternative_used: false,
            handled_error: None,
        }
    }

    fn completed(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::with_status(TaskStatus::Completed)
        }
    }

    fn failed(error: TaskErrorInfo) -> Self {
        Self {
            error: Some(error),
            ..Self::with_status(TaskStatus::Failed)
        }
    }

    fn cancelled() -> Self {
        Self {
            error: Some(TaskErrorInfo {
                kind: ErrorKind::Unknown,
                name: "CancelledError".to_string(),
                message: "task cancelled".to_string(),
                stack: None,
            }),
            ..Self::with_status(TaskStatus::Cancelled)
        }
    }
}

/// Owns the task registry and drives tasks through
/// execute → classify → retry → fallback.
///
/// Cheap to clone; clones share one registry. Cancellation and `stop()` are
/// advisory: they stop further scheduling and abandon the in-flight attempt,
/// but a body only actually halts at its next await point.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

pub struct TaskManagerBuilder {
    config: EngineConfig,
    classifier: ErrorClassifier,
    logger: Arc<dyn LogSink>,
    error_log: Arc<ErrorLog>,
}

impl TaskManagerBuilder {
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = logger;
        self
    }

    pub fn error_log(mut self, error_log: Arc<ErrorLog>) -> Self {
        self.error_log = error_log;
        self
    }

    pub fn build(self) -> Result<TaskManager, ExecutorError> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> TaskManager {
        let events = EventBus::new(self.config.event_capacity);
        let fallback = FallbackHandler::new(self.config.human_approval_needed);
        TaskManager {
            inner: Arc::new(Inner {
                config: self.config,
                registry: Mutex::new(Registry::default()),
                classifier: RwLock::new(self.classifier),
                events,
                control: BatchControl::new(),
                executor: TaskExecutor::new(),
                fallback,
                logger: self.logger,
                error_log: self.error_log,
            }),
        }
    }
}

impl TaskManager {
    pub fn new(config: EngineConfig) -> Result<Self, ExecutorError> {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> TaskManagerBuilder {
        TaskManagerBuilder {
            config,
            classifier: ErrorClassifier::new(),
            logger: Arc::new(TracingSink),
            error_log: Arc::new(ErrorLog::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn error_log(&self) -> Arc<ErrorLog> {
        self.inner.error_log.clone()
    }

    // ---- registry ---------------------------------------------------------

    /// Register a task in PENDING. Only an explicit id can collide; tasks
    /// without one get a fresh uuid.
    pub fn register_task(&self, def: TaskDefinition) -> Result<String, ExecutorError> {
        let task = {
            let mut reg = self.registry();
            let id = match &def.id {
                Some(id) if reg.tasks.contains_key(id) => {
                    return Err(ExecutorError::DuplicateTaskId(id.clone()));
                }
                Some(id) => id.clone(),
                None => Uuid::new_v4().to_string(),
            };

            let task = Task::from_definition(id.clone(), &def, &self.inner.config);
            reg.order.push(id.clone());
            reg.tasks.insert(
                id,
                TaskEntry {
                    task: task.clone(),
                    body: def.body,
                    alternative: def.alternative,
                    on_success: def.on_success,
                    on_error: def.on_error,
                    cancel: CancellationToken::new(),
                },
            );
            task
        };

        self.inner.logger.info(
            "Task registered",
            &json!({ "task_id": task.id, "task_name": task.name }),
        );
        self.emit(TaskEvent::new(
            EventKind::Created,
            &task.id,
            &task.name,
            TaskStatus::Pending,
            0,
        ));
        Ok(task.id)
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.registry().tasks.get(task_id).map(|e| e.task.clone())
    }

    /// All tasks in registration order.
    pub fn get_all_tasks(&self) -> Vec<Task> {
        let reg = self.registry();
        reg.order
            .iter()
            .filter_map(|id| reg.tasks.get(id))
            .map(|e| e.task.clone())
            .collect()
    }

    pub fn get_running_tasks(&self) -> Vec<Task> {
        let reg = self.registry();
        reg.order
            .iter()
            .filter(|id| reg.running.contains(*id))
            .filter_map(|id| reg.tasks.get(id))
            .map(|e| e.task.clone())
            .collect()
    }

    /// Every terminal result recorded so far, in completion order.
    pub fn get_results(&self) -> Vec<TaskResult> {
        self.registry().results.clone()
    }

    pub fn clear_results(&self) {
        self.registry().results.clear();
    }

    pub fn get_status(&self) -> ManagerStatus {
        let state = self.manager_state();
        let reg = self.registry();
        let mut counts = StatusCounts::default();
        for entry in reg.tasks.values() {
            counts.add(entry.task.status);
        }
        ManagerStatus {
            state,
            total: reg.tasks.len(),
            counts,
            running_tasks: reg
                .order
                .iter()
                .filter(|id| reg.running.contains(*id))
                .cloned()
                .collect(),
            results: reg.results.len(),
        }
    }

    /// Check the registered tasks for unknown dependencies and cycles and
    /// return the execution stages.
    pub fn validate_dependencies(&self) -> Result<Vec<Vec<String>>, ExecutorError> {
        let graph = TaskGraph::from_tasks(&self.get_all_tasks())?;
        graph.validate()?;
        graph.topological_sort()
    }

    // ---- classification & events ----------------------------------------

    /// Add a custom pattern; it is consulted after every earlier pattern.
    pub fn register_error_pattern(&self, pattern: ErrorPattern) {
        self.inner
            .classifier
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(pattern);
    }

    pub fn classify_error(&self, error: &TaskError) -> ErrorKind {
        self.inner
            .classifier
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .classify(error)
    }

    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&TaskEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.add_listener(kind, listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    // ---- batch control ----------------------------------------------------

    /// Hold batches at their next checkpoint. In-flight bodies keep running.
    pub fn pause(&self) -> bool {
        let paused = self.inner.control.pause();
        if paused {
            self.inner.logger.info("Execution paused", &Value::Null);
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let resumed = self.inner.control.resume();
        if resumed {
            self.inner.logger.info("Execution resumed", &Value::Null);
        }
        resumed
    }

    /// End the current batch at its next checkpoint; results gathered so far
    /// are returned. The next top-level batch starts clean.
    pub fn stop(&self) {
        self.inner.control.stop();
        self.inner.logger.info("Execution stop requested", &Value::Null);
    }

    /// Cancel a task that has not reached COMPLETED, FAILED or CANCELLED.
    /// Returns false (and changes nothing) otherwise, or if the id is unknown.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let (task, token) = {
            let mut guard = self.registry();
            let reg = &mut *guard;
            let Some(entry) = reg.tasks.get_mut(task_id) else {
                return false;
            };
            let status = entry.task.status;
            let allowed = status == TaskStatus::WaitingForHuman
                || StatusTransition::validate(status, TaskStatus::Cancelled).is_ok();
            if !allowed {
                return false;
            }

            entry.task.status = TaskStatus::Cancelled;
            entry.task.end_time = Some(Utc::now());
            reg.running.remove(task_id);
            (entry.task.clone(), entry.cancel.clone())
        };

        token.cancel();
        self.inner.logger.info(
            "Task cancelled",
            &json!({ "task_id": task.id, "task_name": task.name }),
        );
        self.emit(TaskEvent::new(
            EventKind::Cancelled,
            &task.id,
            &task.name,
            TaskStatus::Cancelled,
            task.retry_count,
        ));
        true
    }

    /// Settle a task parked in WAITING_FOR_HUMAN.
    pub fn resolve_task(
        &self,
        task_id: &str,
        resolution: Resolution,
    ) -> Result<Task, ExecutorError> {
        let (task, on_success, on_error) = {
            let mut reg = self.registry();
            let entry = reg
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| ExecutorError::TaskNotFound(task_id.to_string()))?;

            let to = match &resolution {
                Resolution::Complete(_) => TaskStatus::Completed,
                Resolution::Fail(_) => TaskStatus::Failed,
                Resolution::Retry => TaskStatus::Pending,
            };
            StatusTransition::validate_resolution(entry.task.status, to).map_err(|_| {
                ExecutorError::InvalidState {
                    task_id: task_id.to_string(),
                    status: entry.task.status,
                }
            })?;

            entry.task.status = to;
            if to == TaskStatus::Pending {
                entry.task.retry_count = 0;
                entry.task.start_time = None;
                entry.task.end_time = None;
            } else {
                entry.task.end_time = Some(Utc::now());
            }
            (
                entry.task.clone(),
                entry.on_success.clone(),
                entry.on_error.clone(),
            )
        };

        let meta = json!({ "task_id": task.id, "task_name": task.name });
        match resolution {
            Resolution::Complete(value) => {
                self.resolve_error_records(&task.id, "human:completed");
                self.inner.logger.info("Task completed by operator", &meta);
                self.emit(TaskEvent::new(
                    EventKind::Completed,
                    &task.id,
                    &task.name,
                    task.status,
                    task.retry_count,
                ));
                if let Some(cb) = on_success {
                    invoke_callback(&task.id, || cb(&value));
                }
            }
            Resolution::Fail(reason) => {
                let info = TaskErrorInfo {
                    kind: ErrorKind::Unknown,
                    name: "RejectedByOperator".to_string(),
                    message: reason,
                    stack: None,
                };
                self.inner.logger.warn("Task failed by operator", &meta);
                self.emit(
                    TaskEvent::new(
                        EventKind::Failed,
                        &task.id,
                        &task.name,
                        task.status,
                        task.retry_count,
                    )
                    .with_error(info.clone()),
                );
                if let Some(cb) = on_error {
                    invoke_callback(&task.id, || cb(&info));
                }
            }
            Resolution::Retry => {
                self.inner.logger.info("Task returned to pending", &meta);
            }
        }

        Ok(task)
    }

    // ---- execution --------------------------------------------------------

    /// Run one task to a terminal status.
    ///
    /// Every terminal outcome (FAILED included) is `Ok`; `Err` means the task
    /// could not start: unknown id, not PENDING, or a dependency that is not
    /// COMPLETED.
    pub async fn execute_task(&self, task_id: &str) -> Result<TaskResult, ExecutorError> {
        let _batch = self.inner.control.enter();
        let prepared = self.prepare(task_id)?;

        self.inner.logger.info(
            "Task started",
            &json!({ "task_id": prepared.id, "task_name": prepared.name }),
        );
        self.emit(TaskEvent::new(
            EventKind::Started,
            &prepared.id,
            &prepared.name,
            TaskStatus::Running,
            0,
        ));

        let (outcome, retry_count) = self.drive(&prepared).await;
        Ok(self.settle(&prepared, outcome, retry_count))
    }

    /// Run tasks strictly in order. A hard failure of a task registered with
    /// `continue_on_failure(false)` halts the rest. A member that cannot start
    /// (unmet dependency, unknown id, cancelled while queued) gets a slot
    /// without running and the sequence moves on.
    pub async fn execute_sequence<S>(&self, task_ids: &[S]) -> Result<Vec<TaskResult>, ExecutorError>
    where
        S: AsRef<str> + Sync,
    {
        let _batch = self.inner.control.enter();
        let mut results = Vec::with_capacity(task_ids.len());

        for id in task_ids {
            let id = id.as_ref();
            if self.inner.control.checkpoint().await == Checkpoint::Stop {
                self.inner.logger.info(
                    "Sequence stopped",
                    &json!({ "completed": results.len(), "total": task_ids.len() }),
                );
                break;
            }

            let result = match self.execute_task(id).await {
                Ok(result) => result,
                Err(err) if err.is_unrunnable() => self.unrunnable_result(id, &err),
                Err(err) => return Err(err),
            };

            let halt = result.is_hard_failure() && !self.continues_on_failure(id);
            results.push(result);
            if halt {
                self.inner.logger.warn(
                    "Sequence halted after failure",
                    &json!({ "task_id": id, "remaining": task_ids.len() - results.len() }),
                );
                break;
            }
        }

        Ok(results)
    }

    /// Run tasks in chunks of `max_concurrent`; chunk *i+1* starts once chunk
    /// *i* has resolved. Results are index-aligned with `task_ids`.
    ///
    /// With `fail_fast` the first hard failure becomes
    /// [`ExecutorError::TaskFailed`]; siblings already started keep running
    /// and nothing is fabricated for tasks that never finished.
    pub async fn execute_parallel<S>(
        &self,
        task_ids: &[S],
        options: ParallelOptions,
    ) -> Result<Vec<Option<TaskResult>>, ExecutorError>
    where
        S: AsRef<str> + Sync,
    {
        let _batch = self.inner.control.enter();
        let ids: Vec<String> = task_ids.iter().map(|s| s.as_ref().to_string()).collect();
        let mut slots: Vec<Option<TaskResult>> = vec![None; ids.len()];
        let max_concurrent = options.max_concurrent.or(self.inner.config.max_concurrent);

        for (chunk, range) in chunk_ranges(ids.len(), max_concurrent).into_iter().enumerate() {
            if self.inner.control.checkpoint().await == Checkpoint::Stop {
                self.inner.logger.info("Parallel batch stopped", &json!({ "chunk": chunk }));
                break;
            }

            tracing::debug!(chunk, size = range.len(), "starting chunk");
            let manager = self.clone();
            run_chunk(
                &ids[range.clone()],
                &mut slots[range],
                options.fail_fast,
                move |id| {
                    let manager = manager.clone();
                    async move {
                        match manager.execute_task(&id).await {
                            Err(err) if err.is_cancelled_before_start() => {
                                Ok(manager.unrunnable_result(&id, &err))
                            }
                            other => other,
                        }
                    }
                },
            )
            .await?;
        }

        Ok(slots)
    }

    /// Run every PENDING task stage by stage along the dependency graph.
    /// Slots follow registration order; tasks that did not run stay `None`.
    pub async fn execute_all(
        &self,
        options: ParallelOptions,
    ) -> Result<Vec<Option<TaskResult>>, ExecutorError> {
        let _batch = self.inner.control.enter();
        let tasks = self.get_all_tasks();
        let graph = TaskGraph::from_tasks(&tasks)?;
        graph.validate()?;
        let stages = graph.topological_sort()?;

        let position: HashMap<&str, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();
        let mut slots: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        let stage_options = options.fail_fast(false);

        for stage in stages {
            if self.inner.control.checkpoint().await == Checkpoint::Stop {
                break;
            }

            let runnable: Vec<String> = stage
                .into_iter()
                .filter(|id| {
                    self.get_task(id)
                        .is_some_and(|t| t.status == TaskStatus::Pending)
                })
                .collect();

            let results = self.execute_parallel(&runnable, stage_options).await?;
            for (id, result) in runnable.iter().zip(results) {
                if let Some(&idx) = position.get(id.as_str()) {
                    slots[idx] = result;
                }
            }
        }

        Ok(slots)
    }

    pub async fn run(
        &self,
        target: RunTarget,
        options: ParallelOptions,
    ) -> Result<RunOutcome, ExecutorError> {
        match target {
            RunTarget::Task(id) => self.execute_task(&id).await.map(RunOutcome::Single),
            RunTarget::Sequence(ids) => self.execute_sequence(&ids).await.map(RunOutcome::Sequence),
            RunTarget::Parallel(ids) => self
                .execute_parallel(&ids, options)
                .await
                .map(RunOutcome::Parallel),
        }
    }

    // ---- attempt loop -----------------------------------------------------

    fn prepare(&self, task_id: &str) -> Result<Prepared, ExecutorError> {
        let mut guard = self.registry();
        let reg = &mut *guard;

        let entry = reg
            .tasks
            .get(task_id)
            .ok_or_else(|| ExecutorError::TaskNotFound(task_id.to_string()))?;

        if entry.task.status != TaskStatus::Pending {
            return Err(ExecutorError::InvalidState {
                task_id: task_id.to_string(),
                status: entry.task.status,
            });
        }

        for dep in &entry.task.dependencies {
            match reg.tasks.get(dep) {
                None => {
                    return Err(ExecutorError::DependencyNotFound {
                        task_id: task_id.to_string(),
                        missing_dep: dep.clone(),
                    });
                }
                Some(d) if d.task.status != TaskStatus::Completed => {
                    tracing::warn!(task_id, dependency = %dep, status = %d.task.status, "dependency not satisfied");
                    return Err(ExecutorError::DependencyNotSatisfied {
                        task_id: task_id.to_string(),
                        dependency: dep.clone(),
                        status: d.task.status,
                    });
                }
                Some(_) => {}
            }
        }

        let Some(entry) = reg.tasks.get_mut(task_id) else {
            return Err(ExecutorError::TaskNotFound(task_id.to_string()));
        };

        let start_time = Utc::now();
        entry.task.status = TaskStatus::Running;
        entry.task.retry_count = 0;
        entry.task.start_time = Some(start_time);
        entry.task.end_time = None;
        reg.running.insert(task_id.to_string());

        Ok(Prepared {
            id: entry.task.id.clone(),
            name: entry.task.name.clone(),
            body: entry.body.clone(),
            alternative: entry.alternative.clone(),
            on_success: entry.on_success.clone(),
            on_error: entry.on_error.clone(),
            cancel: entry.cancel.clone(),
            policy: entry.task.retry_policy(&self.inner.config),
            timeout_ms: entry.task.timeout_ms,
            fallback: entry.task.fallback,
            start_time,
        })
    }

    async fn drive(&self, p: &Prepared) -> (Outcome, u32) {
        let mut retry_count = 0u32;

        loop {
            let attempt = self
                .inner
                .executor
                .run(&p.name, &p.body, p.timeout_ms, &p.cancel)
                .await;

            let (err, timed_out) = match attempt {
                Ok(value) => return (Outcome::completed(value), retry_count),
                Err(AttemptError::Cancelled) => return (Outcome::cancelled(), retry_count),
                Err(AttemptError::Failed(err)) => (err, false),
                Err(AttemptError::TimedOut(err)) => (err, true),
            };

            let mut classification = self
                .inner
                .classifier
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .classify_detailed(&err);
            if timed_out {
                classification.kind = ErrorKind::Timeout;
            }
            let kind = classification.kind;

            let record_id = self.inner.error_log.record(
                &p.id,
                kind,
                &classification.pattern,
                &err.name,
                &err.message,
                err.stack.as_deref(),
                json!({ "task_id": p.id, "task_name": p.name, "retry_count": retry_count }),
            );
            self.inner.logger.warn(
                "Task attempt failed",
                &json!({
                    "task_id": p.id,
                    "kind": kind.as_str(),
                    "pattern": classification.pattern,
                    "message": err.message,
                    "retry_count": retry_count,
                }),
            );

            if let Some(remediation) = classification.remediation.clone() {
                let context = RemediationContext {
                    task_id: p.id.clone(),
                    task_name: p.name.clone(),
                    kind,
                    retry_count,
                };
                let attempt = AssertUnwindSafe(remediation.remediate(&err, &context))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(TaskError::named("PanicError", "remediation handler panicked"))
                    });
                match attempt {
                    Ok(value) => {
                        let note = format!("remediation:{}", classification.pattern);
                        self.inner.error_log.mark_resolved(&record_id, &note);
                        self.inner.logger.info(
                            "Error remediated",
                            &json!({ "task_id": p.id, "resolution": note }),
                        );
                        let mut outcome = Outcome::completed(value);
                        outcome.handled_error = Some(err.into_info(kind));
                        return (outcome, retry_count);
                    }
                    Err(remediation_err) => tracing::warn!(
                        task_id = %p.id,
                        pattern = %classification.pattern,
                        error = %remediation_err,
                        "remediation failed"
                    ),
                }
            }

            if p.policy.should_retry(kind, retry_count) {
                let delay = p.policy.next_delay(retry_count);
                retry_count += 1;
                let info = err.into_info(kind);
                match self.backoff(p, retry_count, delay, info).await {
                    Checkpoint::Continue => continue,
                    Checkpoint::Stop => return (Outcome::cancelled(), retry_count),
                }
            }

            if p.policy.is_fatal_error(kind) {
                self.inner.logger.warn(
                    "Non-retryable error, routing to fallback",
                    &json!({ "task_id": p.id, "kind": kind.as_str() }),
                );
            }
            let outcome = self.run_fallback(p, err.into_info(kind)).await;
            return (outcome, retry_count);
        }
    }

    /// RUNNING → RETRYING, wait out `delay`, pass the pre-retry checkpoint,
    /// then back to RUNNING.
    async fn backoff(
        &self,
        p: &Prepared,
        retry_count: u32,
        delay: Duration,
        error: TaskErrorInfo,
    ) -> Checkpoint {
        if !self.transition(&p.id, TaskStatus::Retrying, retry_count) {
            return Checkpoint::Stop;
        }

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.logger.info(
            "Retrying task",
            &json!({ "task_id": p.id, "attempt": retry_count, "delay_ms": delay_ms }),
        );
        self.emit(
            TaskEvent::new(
                EventKind::Retrying,
                &p.id,
                &p.name,
                TaskStatus::Retrying,
                retry_count,
            )
            .with_error(error)
            .with_delay(delay_ms),
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = p.cancel.cancelled() => return Checkpoint::Stop,
        }

        let paused = self.inner.control.state() == BatchState::Paused
            && self.transition(&p.id, TaskStatus::Paused, retry_count);
        if paused {
            self.inner
                .logger
                .info("Task paused before retry", &json!({ "task_id": p.id }));
        }

        let decision = tokio::select! {
            decision = self.inner.control.checkpoint() => decision,
            _ = p.cancel.cancelled() => Checkpoint::Stop,
        };
        if decision == Checkpoint::Stop {
            return Checkpoint::Stop;
        }

        if paused && !self.transition(&p.id, TaskStatus::Retrying, retry_count) {
            return Checkpoint::Stop;
        }
        if !self.transition(&p.id, TaskStatus::Running, retry_count) {
            return Checkpoint::Stop;
        }
        Checkpoint::Continue
    }

    async fn run_fallback(&self, p: &Prepared, error: TaskErrorInfo) -> Outcome {
        let request = FallbackRequest {
            task_name: &p.name,
            alternative: p.alternative.as_ref(),
            timeout_ms: p.timeout_ms,
            cancel: &p.cancel,
        };

        match self.inner.fallback.handle(p.fallback, request).await {
            FallbackOutcome::Recovered(value) => Outcome {
                alternative_used: true,
                handled_error: Some(error),
                ..Outcome::completed(value)
            },
            FallbackOutcome::Skipped => Outcome {
                skipped: true,
                ..Outcome::failed(error)
            },
            FallbackOutcome::Failed => Outcome::failed(error),
            FallbackOutcome::AwaitHuman => Outcome {
                error: Some(error),
                ..Outcome::with_status(TaskStatus::WaitingForHuman)
            },
            FallbackOutcome::Cancelled => Outcome::cancelled(),
        }
    }

    /// Apply the terminal status, record the single result, then notify.
    fn settle(&self, p: &Prepared, mut outcome: Outcome, retry_count: u32) -> TaskResult {
        let end_time = Utc::now();

        let (result, already_cancelled) = {
            let mut guard = self.registry();
            let reg = &mut *guard;
            reg.running.remove(&p.id);

            let mut already_cancelled = false;
            if let Some(entry) = reg.tasks.get_mut(&p.id) {
                if entry.task.status == TaskStatus::Cancelled {
                    already_cancelled = true;
                    if outcome.status != TaskStatus::Cancelled {
                        outcome = Outcome::cancelled();
                    }
                } else if let Err(err) = StatusTransition::validate(entry.task.status, outcome.status)
                {
                    tracing::warn!(task_id = %p.id, error = %err, "unexpected terminal transition");
                }
                entry.task.status = outcome.status;
                entry.task.retry_count = retry_count;
                entry.task.end_time = Some(end_time);
            }

            let duration_ms = (end_time - p.start_time).num_milliseconds().max(0) as u64;
            let result = TaskResult {
                task_id: p.id.clone(),
                task_name: p.name.clone(),
                success: outcome.status == TaskStatus::Completed,
                result: outcome.value,
                error: outcome.error,
                start_time: p.start_time,
                end_time,
                duration_ms,
                retry_count,
                status: outcome.status,
                skipped: outcome.skipped,
                alternative_used: outcome.alternative_used,
                handled_error: outcome.handled_error,
            };
            reg.results.push(result.clone());
            (result, already_cancelled)
        };

        self.notify_terminal(p, &result, already_cancelled);
        result
    }

    fn notify_terminal(&self, p: &Prepared, result: &TaskResult, already_cancelled: bool) {
        let meta = json!({
            "task_id": result.task_id,
            "task_name": result.task_name,
            "status": result.status.as_str(),
            "retry_count": result.retry_count,
            "duration_ms": result.duration_ms,
        });
        let event = |kind: EventKind| {
            let ev = TaskEvent::new(
                kind,
                &result.task_id,
                &result.task_name,
                result.status,
                result.retry_count,
            );
            match &result.error {
                Some(info) => ev.with_error(info.clone()),
                None => ev,
            }
        };

        match result.status {
            TaskStatus::Completed => {
                self.inner.logger.info("Task completed", &meta);
                self.emit(event(EventKind::Completed));
                if let Some(cb) = &p.on_success {
                    let value = result.result.clone().unwrap_or(Value::Null);
                    invoke_callback(&p.id, || cb(&value));
                }
            }
            TaskStatus::Failed => {
                self.inner.logger.error("Task failed", &meta);
                self.emit(event(EventKind::Failed));
                if let (Some(cb), Some(info)) = (&p.on_error, &result.error) {
                    invoke_callback(&p.id, || cb(info));
                }
            }
            TaskStatus::WaitingForHuman => {
                self.inner.logger.warn("Human intervention required", &meta);
                self.emit(event(EventKind::HumanInterventionRequired));
                if let (Some(cb), Some(info)) = (&p.on_error, &result.error) {
                    invoke_callback(&p.id, || cb(info));
                }
            }
            TaskStatus::Cancelled => {
                self.inner.logger.info("Task cancelled", &meta);
                if !already_cancelled {
                    self.emit(event(EventKind::Cancelled));
                }
            }
            other => {
                tracing::warn!(task_id = %p.id, status = %other, "settled in non-terminal status");
            }
        }
    }

    // ---- helpers ----------------------------------------------------------

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TaskEvent) {
        self.inner.events.publish(event);
    }

    fn manager_state(&self) -> ManagerState {
        match self.inner.control.state() {
            // A pause outlives the batch; a stop is cleared by the next one.
            BatchState::Paused => ManagerState::Paused,
            _ if self.inner.control.active() == 0 => ManagerState::Idle,
            BatchState::Stopping => ManagerState::Stopping,
            BatchState::Running => ManagerState::Running,
        }
    }

    /// Returns false when the move is illegal, which in practice means the
    /// task was cancelled from outside.
    fn transition(&self, task_id: &str, to: TaskStatus, retry_count: u32) -> bool {
        let mut reg = self.registry();
        let Some(entry) = reg.tasks.get_mut(task_id) else {
            return false;
        };
        match StatusTransition::validate(entry.task.status, to) {
            Ok(()) => {
                entry.task.status = to;
                entry.task.retry_count = retry_count;
                true
            }
            Err(err) => {
                tracing::debug!(task_id, error = %err, "transition rejected");
                false
            }
        }
    }

    fn continues_on_failure(&self, task_id: &str) -> bool {
        self.registry()
            .tasks
            .get(task_id)
            .map(|e| e.task.continue_on_failure)
            .unwrap_or(true)
    }

    /// Slot for a batch member that never started. A task cancelled while
    /// queued reads CANCELLED; anything else reads FAILED. The task keeps
    /// its status and nothing is added to the results.
    fn unrunnable_result(&self, task_id: &str, err: &ExecutorError) -> TaskResult {
        let name = self
            .get_task(task_id)
            .map(|t| t.name)
            .unwrap_or_else(|| task_id.to_string());
        let (status, error_name) = match err {
            e if e.is_cancelled_before_start() => (TaskStatus::Cancelled, "CancelledError"),
            ExecutorError::DependencyNotSatisfied { .. }
            | ExecutorError::DependencyNotFound { .. } => (TaskStatus::Failed, "DependencyError"),
            ExecutorError::TaskNotFound(_) => (TaskStatus::Failed, "TaskNotFound"),
            _ => (TaskStatus::Failed, "InvalidStateError"),
        };
        self.inner.logger.warn(
            "Task not started",
            &json!({ "task_id": task_id, "status": status.as_str(), "reason": err.to_string() }),
        );

        let now = Utc::now();
        TaskResult {
            task_id: task_id.to_string(),
            task_name: name,
            success: false,
            result: None,
            error: Some(TaskErrorInfo {
                kind: err.error_kind(),
                name: error_name.to_string(),
                message: err.to_string(),
                stack: None,
            }),
            start_time: now,
            end_time: now,
            duration_ms: 0,
            retry_count: 0,
            status,
            skipped: false,
            alternative_used: false,
            handled_error: None,
        }
    }

    fn resolve_error_records(&self, task_id: &str, note: &str) {
        for record in self.inner.error_log.records_for_task(task_id) {
            if !record.resolved {
                self.inner.error_log.mark_resolved(&record.id, note);
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::builder(EngineConfig::default()).assemble()
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("config", &self.inner.config)
            .field("tasks", &self.registry().tasks.len())
            .finish_non_exhaustive()
    }
}

fn invoke_callback(task_id: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(task_id, "task callback panicked");
    }
}
