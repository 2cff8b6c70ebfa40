//! What a run reports back to its trigger.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{Run, RunSnapshot};
use crate::core::{PipelineState, RecipeKind};
use crate::errors::PostflowError;

/// Why a run did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Stable error tag (`provider_error`, `quality_rejected`, ...).
    pub kind: String,
    /// Stage that failed, when one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Human-readable cause.
    pub message: String,
}

impl RunFailure {
    /// Describes `error`, optionally attributed to `stage`.
    #[must_use]
    pub fn new(error: &PostflowError, stage: Option<&str>) -> Self {
        Self {
            kind: error.kind().to_string(),
            stage: stage.map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// Result of [`PipelineStateMachine::run`](super::PipelineStateMachine::run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run id.
    pub run_id: Uuid,
    /// Recipe executed.
    pub recipe: RecipeKind,
    /// True only for runs that reached COMPLETED.
    pub success: bool,
    /// Names of successful stage entries, in completion order.
    pub stages_completed: Vec<String>,
    /// Terminal state: COMPLETED, ERROR or IDLE.
    pub final_state: PipelineState,
    /// Cause of an ERROR, an approval timeout or a rejected start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    /// The run as it ended.
    pub snapshot: RunSnapshot,
}

impl RunOutcome {
    pub(crate) fn from_run(run: &Run, error: Option<RunFailure>) -> Self {
        Self {
            run_id: run.id(),
            recipe: run.recipe(),
            success: run.state() == PipelineState::Completed,
            stages_completed: run.context().completed_stages(),
            final_state: run.state(),
            error,
            snapshot: run.snapshot(),
        }
    }

    /// Returns true if the run was cancelled or timed out at a gate.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.final_state == PipelineState::Idle
            && self.error.as_ref().map_or(true, |e| e.kind == "approval_timeout")
    }

    /// Serializes to JSON.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageResult;

    #[test]
    fn test_outcome_from_completed_run() {
        let mut run = Run::new(RecipeKind::Autonomous);
        run.transition(PipelineState::Planning).unwrap();
        run.record(StageResult::success("plan_topic", serde_json::Value::Null))
            .unwrap();
        run.record(StageResult::failure("create_content", "quota")).unwrap();
        run.finish(PipelineState::Completed).unwrap();

        let outcome = RunOutcome::from_run(&run, None);
        assert!(outcome.success);
        assert_eq!(outcome.stages_completed, vec!["plan_topic"]);
        assert_eq!(outcome.snapshot.stages.len(), 2);
        assert!(!outcome.was_cancelled());
    }

    #[test]
    fn test_failure_carries_kind_and_stage() {
        let failure = RunFailure::new(
            &PostflowError::unrecoverable("disk full"),
            Some("publish"),
        );
        assert_eq!(failure.kind, "unrecoverable");
        assert_eq!(failure.stage.as_deref(), Some("publish"));
        assert!(failure.message.contains("disk full"));
    }
}
