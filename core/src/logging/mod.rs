//! Logging seams for the engine.
//!
//! Diagnostics go through `tracing` everywhere. Two extra surfaces exist for
//! callers that want the records in hand:
//!
//! - [`LogSink`]: structured lifecycle lines (task started, retrying, ...),
//!   with [`TracingSink`] as the default and [`MemorySink`] for capture.
//! - [`ErrorLog`]: every failed attempt with its classification, used for
//!   per-kind/per-pattern counts and resolution bookkeeping.

mod error_log;
mod sink;

pub use error_log::{ErrorLog, ErrorRecord};
pub use sink::{LogLevel, LogRecord, LogSink, MemorySink, TracingSink};
