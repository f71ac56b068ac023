//! # Task state machine
//!
//! Status values tracked per task plus the rules that govern how one status
//! may follow another within a single execution run.
//!
//! ```text
//! PENDING ──► RUNNING ──► COMPLETED | FAILED | WAITING_FOR_HUMAN
//!               │  ▲
//!               ▼  │
//!            RETRYING ◄──► PAUSED
//!
//! any non-terminal ──► CANCELLED
//! ```

pub mod transitions;
pub mod types;

pub use transitions::{StatusTransition, TransitionError};
pub use types::{BatchState, TaskStatus};
