//! Test assertions for run outcomes.

use crate::core::PipelineState;
use crate::pipeline::RunOutcome;

/// Asserts that the run reached COMPLETED.
pub fn assert_completed(outcome: &RunOutcome) {
    assert!(
        outcome.success && outcome.final_state == PipelineState::Completed,
        "Expected a completed run, got {:?} with error {:?}",
        outcome.final_state,
        outcome.error
    );
}

/// Asserts that the run ended in ERROR with the given error kind.
pub fn assert_failed_with(outcome: &RunOutcome, kind: &str) {
    assert!(
        !outcome.success && outcome.final_state == PipelineState::Error,
        "Expected a failed run, got {:?}",
        outcome.final_state
    );
    let actual = outcome.error.as_ref().map(|e| e.kind.as_str());
    assert_eq!(
        actual,
        Some(kind),
        "Expected error kind '{}', got {:?}",
        kind,
        outcome.error
    );
}

/// Asserts that the run went back to IDLE without publishing.
pub fn assert_cancelled(outcome: &RunOutcome) {
    assert!(
        !outcome.success && outcome.was_cancelled(),
        "Expected a cancelled run, got {:?} with error {:?}",
        outcome.final_state,
        outcome.error
    );
}

/// Asserts the terminal state.
pub fn assert_final_state(outcome: &RunOutcome, expected: PipelineState) {
    assert_eq!(
        outcome.final_state, expected,
        "Expected final state {:?}, got {:?}",
        expected, outcome.final_state
    );
}

/// Asserts the successful stage entries, in order.
pub fn assert_stages(outcome: &RunOutcome, expected: &[&str]) {
    let actual: Vec<&str> = outcome.stages_completed.iter().map(String::as_str).collect();
    assert_eq!(
        actual, expected,
        "Expected stages {:?}, got {:?}",
        expected, actual
    );
}
