mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    always_fail, flaky, kinds, manager, manager_with, ok, record_events, sleepy, test_config,
    wait_for,
};
use pretty_assertions::assert_eq;
use resilient_core::{
    task_fn, EngineConfig, ErrorKind, ErrorPattern, EventKind, ExecutorError, FallbackStrategy,
    LogLevel, ManagerState, Remediation, RemediationContext, Resolution, TaskDefinition, TaskError,
    TaskStatus,
};
use serde_json::json;
use tokio::time::Instant;

#[tokio::test]
async fn immediate_success_runs_pending_running_completed() {
    let mgr = manager();
    let events = record_events(&mgr);
    let id = mgr
        .register_task(TaskDefinition::new("ping", ok(json!("pong"))))
        .unwrap();
    assert_eq!(mgr.get_task(&id).unwrap().status, TaskStatus::Pending);

    let result = mgr.execute_task(&id).await.unwrap();

    assert!(result.success);
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.retry_count, 0);
    assert_eq!(result.result, Some(json!("pong")));
    assert!(result.error.is_none());
    assert!(result.end_time >= result.start_time);
    assert_eq!(
        kinds(&events, &id),
        vec![EventKind::Created, EventKind::Started, EventKind::Completed]
    );

    let task = mgr.get_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.start_time.is_some() && task.end_time.is_some());
    assert_eq!(mgr.get_results().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn network_failures_retry_with_exponential_backoff() {
    let mgr = manager();
    let events = record_events(&mgr);
    let (body, calls) = flaky(2, "ECONNRESET: connection reset by peer");
    let id = mgr
        .register_task(TaskDefinition::new("fetch", body).with_max_retries(3))
        .unwrap();

    let started = Instant::now();
    let result = mgr.execute_task(&id).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.retry_count, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let delays: Vec<u64> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == EventKind::Retrying)
        .filter_map(|e| e.delay_ms)
        .collect();
    assert_eq!(delays, vec![100, 200]);
    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(350), "elapsed {elapsed:?}");

    let log = mgr.error_log();
    assert_eq!(log.count(), 2);
    assert_eq!(log.count_by_kind(ErrorKind::Network), 2);
    assert_eq!(log.count_by_pattern("network"), 2);
}

#[tokio::test]
async fn authentication_failure_waits_for_human_without_retrying() {
    let mgr = manager();
    let events = record_events(&mgr);
    let (body, calls) = flaky(usize::MAX, "401 Unauthorized: invalid token");
    let id = mgr
        .register_task(TaskDefinition::new("deploy", body).with_max_retries(3))
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();

    assert_eq!(result.status, TaskStatus::WaitingForHuman);
    assert_eq!(result.retry_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Authentication);
    assert_eq!(error.message, "401 Unauthorized: invalid token");
    assert_eq!(
        kinds(&events, &id),
        vec![
            EventKind::Created,
            EventKind::Started,
            EventKind::HumanInterventionRequired
        ]
    );
}

#[tokio::test]
async fn authentication_failure_with_skip_fallback_fails() {
    let mgr = manager();
    let id = mgr
        .register_task(
            TaskDefinition::new("deploy", always_fail("unauthorized"))
                .with_max_retries(3)
                .with_fallback(FallbackStrategy::Skip),
        )
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.skipped);
    assert_eq!(result.retry_count, 0);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Authentication);
}

#[tokio::test]
async fn human_intervention_degrades_to_failure_when_approval_disabled() {
    let config = EngineConfig {
        human_approval_needed: false,
        ..test_config()
    };
    let (mgr, _sink) = manager_with(config);
    let id = mgr
        .register_task(TaskDefinition::new("rotate-keys", always_fail("403 Forbidden")))
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert!(!result.skipped);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Permission);
}

#[tokio::test]
async fn unmet_dependencies_reject_execution() {
    let mgr = manager();
    let parent = mgr
        .register_task(TaskDefinition::new("parent", ok(json!(1))).with_id("parent"))
        .unwrap();
    let child = mgr
        .register_task(
            TaskDefinition::new("child", ok(json!(2)))
                .with_id("child")
                .depends_on([parent.as_str()]),
        )
        .unwrap();
    let orphan = mgr
        .register_task(TaskDefinition::new("orphan", ok(json!(3))).depends_on(["ghost"]))
        .unwrap();

    let err = mgr.execute_task(&child).await.unwrap_err();
    assert_eq!(
        err,
        ExecutorError::DependencyNotSatisfied {
            task_id: "child".into(),
            dependency: "parent".into(),
            status: TaskStatus::Pending,
        }
    );
    assert_eq!(mgr.get_task(&child).unwrap().status, TaskStatus::Pending);
    assert!(matches!(
        mgr.execute_task(&orphan).await,
        Err(ExecutorError::DependencyNotFound { .. })
    ));

    mgr.execute_task(&parent).await.unwrap();
    let result = mgr.execute_task(&child).await.unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn deadline_is_classified_as_timeout_and_retried() {
    let mgr = manager();
    let id = mgr
        .register_task(
            TaskDefinition::new("slow", sleepy(10_000, json!("late")))
                .with_timeout_ms(50)
                .with_max_retries(1)
                .with_retry_delay_ms(10)
                .with_fallback(FallbackStrategy::Fail),
        )
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.retry_count, 1);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert_eq!(error.name, "TimeoutError");
    assert_eq!(mgr.error_log().count_by_kind(ErrorKind::Timeout), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_settles_cancelled() {
    let mgr = manager();
    let events = record_events(&mgr);
    let mut rx = mgr.subscribe();
    let id = mgr
        .register_task(
            TaskDefinition::new("sync", always_fail("network unreachable"))
                .with_retry_delay_ms(60_000),
        )
        .unwrap();

    let handle = {
        let mgr = mgr.clone();
        let id = id.clone();
        tokio::spawn(async move { mgr.execute_task(&id).await })
    };

    wait_for(&mut rx, EventKind::Retrying).await;
    assert_eq!(mgr.get_running_tasks().len(), 1);
    assert!(mgr.cancel_task(&id));

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status, TaskStatus::Cancelled);
    assert_eq!(result.retry_count, 1);
    assert!(mgr.get_running_tasks().is_empty());
    assert!(!mgr.cancel_task(&id));

    let cancelled = kinds(&events, &id)
        .into_iter()
        .filter(|k| *k == EventKind::Cancelled)
        .count();
    assert_eq!(cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn pause_holds_retry_until_resume() {
    let mgr = manager();
    let mut rx = mgr.subscribe();
    let (body, calls) = flaky(1, "503 Service Unavailable");
    let id = mgr
        .register_task(TaskDefinition::new("poll", body))
        .unwrap();

    assert!(mgr.pause());
    let handle = {
        let mgr = mgr.clone();
        let id = id.clone();
        tokio::spawn(async move { mgr.execute_task(&id).await })
    };

    wait_for(&mut rx, EventKind::Retrying).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(mgr.get_task(&id).unwrap().status, TaskStatus::Paused);
    assert_eq!(mgr.get_status().state, ManagerState::Paused);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(mgr.resume());
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.retry_count, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_at_retry_checkpoint_cancels_task() {
    let mgr = manager();
    let mut rx = mgr.subscribe();
    let id = mgr
        .register_task(TaskDefinition::new("crawl", always_fail("ECONNREFUSED")))
        .unwrap();

    let handle = {
        let mgr = mgr.clone();
        let id = id.clone();
        tokio::spawn(async move { mgr.execute_task(&id).await })
    };

    wait_for(&mut rx, EventKind::Retrying).await;
    mgr.stop();

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status, TaskStatus::Cancelled);
    assert_eq!(mgr.get_task(&id).unwrap().status, TaskStatus::Cancelled);
}

struct ReissueToken {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Remediation for ReissueToken {
    async fn remediate(
        &self,
        _error: &TaskError,
        context: &RemediationContext,
    ) -> Result<serde_json::Value, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "reissued_for": context.task_name }))
    }
}

#[tokio::test]
async fn remediation_completes_task_and_resolves_error_record() {
    let mgr = manager();
    let remediations = Arc::new(AtomicUsize::new(0));
    mgr.register_error_pattern(
        ErrorPattern::keywords("seat-pool", ErrorKind::Unknown, &["seat pool exhausted"])
            .with_remediation(Arc::new(ReissueToken {
                calls: remediations.clone(),
            })),
    );
    let id = mgr
        .register_task(TaskDefinition::new(
            "license",
            always_fail("seat pool exhausted for org acme"),
        ))
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.result, Some(json!({ "reissued_for": "license" })));
    assert_eq!(result.retry_count, 0);
    assert_eq!(result.handled_error.unwrap().kind, ErrorKind::Unknown);
    assert_eq!(remediations.load(Ordering::SeqCst), 1);

    let records = mgr.error_log().records();
    assert_eq!(records.len(), 1);
    assert!(records[0].resolved);
    assert_eq!(records[0].pattern, "seat-pool");
    assert_eq!(records[0].resolution.as_deref(), Some("remediation:seat-pool"));
}

#[tokio::test]
async fn failing_remediation_falls_through_to_retry_policy() {
    let mgr = manager();
    let remediate = |_err: TaskError, _ctx: RemediationContext| async {
        Err::<serde_json::Value, _>(TaskError::new("still broken"))
    };
    mgr.register_error_pattern(
        ErrorPattern::new("vault", ErrorKind::Authentication, |e| {
            e.message.contains("vault sealed")
        })
        .with_remediation(Arc::new(remediate)),
    );
    let id = mgr
        .register_task(
            TaskDefinition::new("secrets", always_fail("vault sealed"))
                .with_fallback(FallbackStrategy::Fail),
        )
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.retry_count, 0);
    assert!(!mgr.error_log().records()[0].resolved);
}

#[tokio::test]
async fn panicking_remediation_counts_as_failed_remediation() {
    let mgr = manager();
    let remediate = |_err: TaskError,
                     _ctx: RemediationContext|
     -> std::future::Ready<Result<serde_json::Value, TaskError>> {
        panic!("remediation handler bug")
    };
    mgr.register_error_pattern(
        ErrorPattern::keywords("quota", ErrorKind::Authentication, &["quota key revoked"])
            .with_remediation(Arc::new(remediate)),
    );
    let id = mgr
        .register_task(
            TaskDefinition::new("billing", always_fail("quota key revoked"))
                .with_fallback(FallbackStrategy::Fail),
        )
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.handled_error.is_none());
    assert!(!mgr.error_log().records()[0].resolved);
}

#[tokio::test]
async fn alternative_fallback_stands_in_for_failed_task() {
    let mgr = manager();
    let id = mgr
        .register_task(
            TaskDefinition::new("primary", always_fail("invalid payload"))
                .with_max_retries(0)
                .with_fallback(FallbackStrategy::AlternativeTask)
                .with_alternative(ok(json!("from mirror"))),
        )
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert!(result.alternative_used);
    assert_eq!(result.result, Some(json!("from mirror")));
    assert_eq!(result.handled_error.unwrap().kind, ErrorKind::Validation);
}

#[tokio::test]
async fn operator_resolution_unblocks_dependents() {
    let mgr = manager();
    let gate = mgr
        .register_task(TaskDefinition::new("approve", always_fail("permission denied")).with_id("gate"))
        .unwrap();
    let next = mgr
        .register_task(TaskDefinition::new("ship", ok(json!("shipped"))).depends_on(["gate"]))
        .unwrap();

    let parked = mgr.execute_task(&gate).await.unwrap();
    assert_eq!(parked.status, TaskStatus::WaitingForHuman);
    assert!(!mgr.cancel_task("missing-id"));
    assert!(matches!(
        mgr.execute_task(&next).await,
        Err(ExecutorError::DependencyNotSatisfied { .. })
    ));

    let task = mgr
        .resolve_task(&gate, Resolution::Complete(json!("approved by ops")))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(mgr.error_log().records().iter().all(|r| r.resolved));
    assert!(matches!(
        mgr.resolve_task(&gate, Resolution::Retry),
        Err(ExecutorError::InvalidState { .. })
    ));

    let result = mgr.execute_task(&next).await.unwrap();
    assert_eq!(result.result, Some(json!("shipped")));
}

#[tokio::test]
async fn operator_retry_returns_task_to_pending() {
    let mgr = manager();
    let (body, calls) = flaky(1, "access denied");
    let id = mgr.register_task(TaskDefinition::new("mount", body)).unwrap();

    let first = mgr.execute_task(&id).await.unwrap();
    assert_eq!(first.status, TaskStatus::WaitingForHuman);

    let task = mgr.resolve_task(&id, Resolution::Retry).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 0);

    let second = mgr.execute_task(&id).await.unwrap();
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(mgr.get_results().len(), 2);
}

#[tokio::test]
async fn waiting_task_can_be_cancelled_or_failed() {
    let mgr = manager();
    let a = mgr
        .register_task(TaskDefinition::new("a", always_fail("unauthenticated")))
        .unwrap();
    let b = mgr
        .register_task(TaskDefinition::new("b", always_fail("unauthenticated")))
        .unwrap();
    mgr.execute_task(&a).await.unwrap();
    mgr.execute_task(&b).await.unwrap();

    assert!(mgr.cancel_task(&a));
    assert_eq!(mgr.get_task(&a).unwrap().status, TaskStatus::Cancelled);

    let task = mgr
        .resolve_task(&b, Resolution::Fail("credentials revoked".into()))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(!mgr.cancel_task(&b));
}

#[tokio::test]
async fn callbacks_run_once_at_terminal_outcome() {
    let mgr = manager();
    let successes = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let s = successes.clone();
    let good = mgr
        .register_task(
            TaskDefinition::new("good", ok(json!(7))).on_success(move |v| s.lock().unwrap().push(v.clone())),
        )
        .unwrap();
    let e = errors.clone();
    let bad = mgr
        .register_task(
            TaskDefinition::new("bad", always_fail("malformed response"))
                .with_max_retries(2)
                .with_retry_delay_ms(1)
                .with_fallback(FallbackStrategy::Fail)
                .on_error(move |info| e.lock().unwrap().push(info.kind)),
        )
        .unwrap();

    mgr.execute_task(&good).await.unwrap();
    let failed = mgr.execute_task(&bad).await.unwrap();

    assert_eq!(*successes.lock().unwrap(), vec![json!(7)]);
    assert_eq!(*errors.lock().unwrap(), vec![ErrorKind::Validation]);
    assert_eq!(failed.retry_count, 2);
}

#[tokio::test]
async fn failing_listener_does_not_break_orchestration() {
    let mgr = manager();
    mgr.add_event_listener(EventKind::Started, |_| anyhow::bail!("dashboard offline"));
    mgr.add_event_listener(EventKind::Completed, |_| panic!("listener bug"));

    let id = mgr
        .register_task(TaskDefinition::new("report", ok(json!("done"))))
        .unwrap();
    let result = mgr.execute_task(&id).await.unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
}

#[tokio::test]
async fn lifecycle_lines_reach_the_log_sink() {
    let (mgr, sink) = manager_with(test_config());
    let id = mgr
        .register_task(
            TaskDefinition::new("index", always_fail("ENOENT: no such file or directory"))
                .with_retry_delay_ms(1)
                .with_fallback(FallbackStrategy::Skip),
        )
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();
    assert!(result.skipped);
    assert_eq!(result.retry_count, 3);

    let info = sink.messages(LogLevel::Info);
    assert!(info.contains(&"Task registered".to_string()));
    assert!(info.contains(&"Task started".to_string()));
    assert_eq!(
        info.iter().filter(|m| m.as_str() == "Retrying task").count(),
        3
    );
    assert_eq!(sink.messages(LogLevel::Error), vec!["Task failed".to_string()]);
    assert_eq!(mgr.error_log().count_by_kind(ErrorKind::Filesystem), 4);
}

#[tokio::test]
async fn plain_closures_work_as_task_bodies() {
    let mgr = manager();
    let id = mgr
        .register_task(TaskDefinition::from_fn("read-config", || async {
            let raw = std::fs::read_to_string("/definitely/not/here.toml")?;
            Ok::<_, TaskError>(json!(raw))
        })
        .with_max_retries(0)
        .with_fallback(FallbackStrategy::Fail))
        .unwrap();

    let result = mgr.execute_task(&id).await.unwrap();
    let error = result.error.unwrap();
    assert_eq!(error.name, "IoError");
    assert_eq!(error.kind, ErrorKind::Filesystem);

    let body = task_fn(|| async { Err(TaskError::named("NetworkError", "upstream went away")) });
    assert_eq!(
        mgr.classify_error(&TaskError::named("NetworkError", "upstream went away")),
        ErrorKind::Network
    );
    let id = mgr
        .register_task(TaskDefinition::new("upstream", body).with_max_retries(0))
        .unwrap();
    let result = mgr.execute_task(&id).await.unwrap();
    assert_eq!(result.status, TaskStatus::WaitingForHuman);
}
