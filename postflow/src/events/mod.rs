//! Observer interface for run lifecycle events.
//!
//! The state machine and the fallback router emit through an
//! [`EventSink`] injected at construction; there is no global sink.
//!
//! Event types: `run.started`, `run.state_changed`, `stage.completed`,
//! `stage.failed`, `approval.requested`, `approval.resolved`,
//! `provider.fallback`, `run.completed`, `run.failed`, `run.cancelled`.

mod sink;

pub use sink::{emit_run_event, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
