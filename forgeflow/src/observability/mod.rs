//! Observability utilities.

mod subscriber;
mod wide_events;

pub use subscriber::{init_tracing, LogFormat};
pub use wide_events::{emit_run_summary, RunSummary};
