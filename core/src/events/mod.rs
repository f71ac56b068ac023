//! # Lifecycle events
//!
//! Every status change the task manager makes is published on an
//! [`EventBus`]. Consumers either register a listener for one
//! [`EventKind`] or take a broadcast receiver of everything.

mod bus;
mod types;

pub use bus::{EventBus, ListenerId};
pub use types::{EventKind, TaskEvent};
