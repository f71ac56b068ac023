//! Event bus: keyed listeners plus a broadcast channel.
//!
//! - Listeners run synchronously on the publishing task, in registration order.
//! - A listener returning an error, or panicking, is logged and skipped; the
//!   remaining listeners and the orchestration loop carry on.
//! - The broadcast side is fire-and-forget: no receivers means the event is
//!   dropped, slow receivers observe `RecvError::Lagged`.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use super::types::{EventKind, TaskEvent};

type Listener = Arc<dyn Fn(&TaskEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&TaskEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for entries in listeners.values_mut() {
            let before = entries.len();
            entries.retain(|(lid, _)| *lid != id);
            removed |= entries.len() != before;
        }
        removed
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: TaskEvent) {
        // clone out so listeners may (un)register without deadlocking
        let targets: Vec<(ListenerId, Listener)> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners.get(&event.kind).cloned().unwrap_or_default()
        };

        for (id, listener) in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(
                    listener = id.0,
                    event = event.kind.as_str(),
                    task_id = %event.task_id,
                    error = %err,
                    "event listener failed"
                ),
                Err(_) => tracing::error!(
                    listener = id.0,
                    event = event.kind.as_str(),
                    task_id = %event.task_id,
                    "event listener panicked"
                ),
            }
        }

        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
