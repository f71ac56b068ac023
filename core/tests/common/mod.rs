#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use resilient_core::{
    task_fn, EngineConfig, EventKind, MemorySink, TaskBody, TaskError, TaskEvent, TaskManager,
};
use serde_json::{json, Value};

/// Engine config with short delays and no jitter.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        base_retry_delay_ms: 100,
        timeout_ms: 5_000,
        ..EngineConfig::default()
    }
}

/// Route engine logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn manager() -> TaskManager {
    init_tracing();
    TaskManager::new(test_config()).expect("valid test config")
}

pub fn manager_with(config: EngineConfig) -> (TaskManager, Arc<MemorySink>) {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let manager = TaskManager::builder(config)
        .logger(sink.clone())
        .build()
        .expect("valid test config");
    (manager, sink)
}

pub fn ok(value: Value) -> TaskBody {
    task_fn(move || {
        let value = value.clone();
        async move { Ok(value) }
    })
}

pub fn always_fail(message: &'static str) -> TaskBody {
    task_fn(move || async move { Err(TaskError::new(message)) })
}

/// Fails `failures` times with `message`, then succeeds. Returns the call counter.
pub fn flaky(failures: usize, message: &'static str) -> (TaskBody, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let body = task_fn(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < failures {
                Err(TaskError::new(message))
            } else {
                Ok(json!({ "attempts": n + 1 }))
            }
        }
    });
    (body, calls)
}

pub fn sleepy(ms: u64, value: Value) -> TaskBody {
    task_fn(move || {
        let value = value.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(value)
        }
    })
}

/// Capture every lifecycle event through keyed listeners.
pub fn record_events(manager: &TaskManager) -> Arc<Mutex<Vec<TaskEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let sink = seen.clone();
        manager.add_event_listener(kind, move |ev| {
            sink.lock().unwrap().push(ev.clone());
            Ok(())
        });
    }
    seen
}

pub fn kinds(events: &Arc<Mutex<Vec<TaskEvent>>>, task_id: &str) -> Vec<EventKind> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.task_id == task_id)
        .map(|e| e.kind)
        .collect()
}

/// Wait for the first broadcast event of `kind`.
pub async fn wait_for(
    rx: &mut tokio::sync::broadcast::Receiver<TaskEvent>,
    kind: EventKind,
) -> TaskEvent {
    loop {
        match rx.recv().await {
            Ok(ev) if ev.kind == kind => return ev,
            Ok(_) => continue,
            Err(err) => panic!("event stream ended while waiting for {kind:?}: {err}"),
        }
    }
}
