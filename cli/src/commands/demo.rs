//! A canned batch that walks every disposition the engine has: plain success,
//! retry-then-success, skip, alternative body, and human intervention.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context;
use resilient_core::{
    task_fn, AppConfig, EventKind, FallbackStrategy, ParallelOptions, Resolution, TaskDefinition,
    TaskError, TaskManager, TaskResult, TaskStatus,
};
use serde_json::json;

use super::cli::{DemoArgs, DemoMode};

pub async fn run(args: DemoArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let mut engine = cfg.engine.clone();
    engine.base_retry_delay_ms = args.base_delay_ms;
    engine.max_retry_delay_ms = engine.max_retry_delay_ms.max(args.base_delay_ms);
    if args.max_concurrent.is_some() {
        engine.max_concurrent = args.max_concurrent;
    }

    let manager = TaskManager::new(engine).context("build task manager")?;
    for kind in [
        EventKind::Retrying,
        EventKind::Failed,
        EventKind::HumanInterventionRequired,
    ] {
        manager.add_event_listener(kind, |event| {
            tracing::info!(
                event = event.kind.as_str(),
                task = %event.task_name,
                retry = event.retry_count,
                delay_ms = ?event.delay_ms,
                error = ?event.error.as_ref().map(|e| e.message.as_str()),
                "task event"
            );
            Ok(())
        });
    }

    let order = register_tasks(&manager)?;

    let results: Vec<TaskResult> = match args.mode {
        DemoMode::Sequence => manager.execute_sequence(order.as_slice()).await?,
        DemoMode::Graph => manager
            .execute_all(
                args.max_concurrent
                    .map(ParallelOptions::new)
                    .unwrap_or_default(),
            )
            .await?
            .into_iter()
            .flatten()
            .collect(),
    };

    if args.auto_approve {
        for task in manager.get_all_tasks() {
            if task.status == TaskStatus::WaitingForHuman {
                let value = json!({ "approved_by": "cli" });
                manager.resolve_task(&task.id, Resolution::Complete(value))?;
                tracing::info!(task = %task.name, "approved");
            }
        }
    }

    print_results(&results, args.json)?;

    let status = manager.get_status();
    println!(
        "completed={} failed={} waiting={} cancelled={} errors_logged={}",
        status.counts.completed,
        status.counts.failed,
        status.counts.waiting_for_human,
        status.counts.cancelled,
        manager.error_log().count()
    );

    let hard_failures = results.iter().filter(|r| r.is_hard_failure()).count();
    Ok(if hard_failures == 0 { 0 } else { 1 })
}

fn register_tasks(manager: &TaskManager) -> anyhow::Result<Vec<String>> {
    let fetch_calls = Arc::new(AtomicU32::new(0));

    let defs = vec![
        TaskDefinition::from_fn("load-config", || async {
            Ok(json!({ "region": "eu-west-1" }))
        })
        .with_id("load-config"),
        TaskDefinition::from_fn("fetch-upstream", move || {
            let calls = fetch_calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(TaskError::named("NetworkError", "ECONNRESET while reading"));
                }
                Ok(json!({ "rows": 128 }))
            }
        })
        .with_id("fetch-upstream")
        .depends_on(["load-config"]),
        TaskDefinition::from_fn("validate-payload", || async {
            Err(TaskError::new("invalid payload: missing field `id`"))
        })
        .with_id("validate-payload")
        .with_fallback(FallbackStrategy::Skip),
        TaskDefinition::from_fn("publish", || async {
            Err(TaskError::new("401 unauthorized: token expired"))
        })
        .with_id("publish")
        .depends_on(["fetch-upstream"])
        .with_fallback(FallbackStrategy::AlternativeTask)
        .with_alternative(task_fn(|| async { Ok(json!({ "queued": true })) })),
        TaskDefinition::from_fn("notify-oncall", || async {
            Err(TaskError::new("503 service unavailable"))
        })
        .with_id("notify-oncall")
        .with_max_retries(1),
    ];

    defs.into_iter()
        .map(|def| manager.register_task(def).map_err(anyhow::Error::from))
        .collect()
}

fn print_results(results: &[TaskResult], as_json: bool) -> anyhow::Result<()> {
    if as_json {
        for r in results {
            println!("{}", serde_json::to_string(r).context("serialize result")?);
        }
        return Ok(());
    }

    println!("{:<18} {:<18} {:>7} {:>9}  detail", "task", "status", "retries", "ms");
    for r in results {
        let detail = match (&r.result, &r.error) {
            (_, Some(e)) => format!("{}: {}", e.kind, e.message),
            (Some(v), None) => v.to_string(),
            (None, None) => String::new(),
        };
        let status = if r.skipped {
            format!("{} (skipped)", r.status)
        } else if r.alternative_used {
            format!("{} (alt)", r.status)
        } else {
            r.status.to_string()
        };
        println!(
            "{:<18} {:<18} {:>7} {:>9}  {}",
            r.task_name, status, r.retry_count, r.duration_ms, detail
        );
    }
    Ok(())
}
