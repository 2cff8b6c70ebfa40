//! Per-run state.
//!
//! This module provides:
//! - The append-only [`StageContext`] holding every stage result
//! - The [`Run`] record the state machine owns and freezes when done

mod bags;
mod run;

pub use bags::StageContext;
pub use run::{Run, RunSnapshot};
