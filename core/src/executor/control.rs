//! Batch gate behind `pause()` / `resume()` / `stop()`.
//!
//! The orchestration loop only looks at the gate at its checkpoints
//! (between sequential tasks, between parallel chunks, before a retry).
//! A running body is never suspended.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::state::BatchState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

#[derive(Debug)]
pub struct BatchControl {
    tx: watch::Sender<BatchState>,
    depth: Arc<AtomicUsize>,
}

impl BatchControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BatchState::Running);
        Self {
            tx,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> BatchState {
        *self.tx.borrow()
    }

    /// Number of batches (or top-level task runs) currently in flight.
    pub fn active(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn pause(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == BatchState::Running {
                *state = BatchState::Paused;
                true
            } else {
                false
            }
        })
    }

    pub fn resume(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == BatchState::Paused {
                *state = BatchState::Running;
                true
            } else {
                false
            }
        })
    }

    pub fn stop(&self) {
        self.tx.send_replace(BatchState::Stopping);
    }

    /// Enter a batch. The outermost entry clears a stale stop request; a
    /// pause is left in place.
    pub fn enter(&self) -> BatchGuard {
        if self.depth.fetch_add(1, Ordering::SeqCst) == 0 {
            self.tx.send_if_modified(|state| {
                if *state == BatchState::Stopping {
                    *state = BatchState::Running;
                    true
                } else {
                    false
                }
            });
        }
        BatchGuard {
            depth: self.depth.clone(),
        }
    }

    /// Wait while paused; report whether the batch should go on.
    pub async fn checkpoint(&self) -> Checkpoint {
        let mut rx = self.tx.subscribe();
        loop {
            match *rx.borrow_and_update() {
                BatchState::Running => return Checkpoint::Continue,
                BatchState::Stopping => return Checkpoint::Stop,
                BatchState::Paused => {}
            }
            if rx.changed().await.is_err() {
                return Checkpoint::Stop;
            }
        }
    }
}

impl Default for BatchControl {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "the batch ends when the guard is dropped"]
#[derive(Debug)]
pub struct BatchGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
