//! The run record owned by the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StageContext;
use crate::core::{PipelineState, RecipeKind};
use crate::errors::PostflowError;
use crate::stages::StageResult;

/// Point-in-time copy of a run, returned with every outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Run id.
    pub id: Uuid,
    /// Recipe executed.
    pub recipe: RecipeKind,
    /// State when the snapshot was taken.
    pub state: PipelineState,
    /// Every stage result, in append order.
    pub stages: Vec<StageResult>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    /// Wall-clock seconds from creation to the terminal state.
    #[must_use]
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|end| crate::utils::seconds_between(&self.created_at, &end))
    }
}

/// One end-to-end execution of a recipe.
///
/// Only the state machine mutates a run. Once [`Run::finish`] has been
/// called the run rejects further transitions and appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    id: Uuid,
    recipe: RecipeKind,
    state: PipelineState,
    context: StageContext,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Creates a run in the IDLE state.
    #[must_use]
    pub fn new(recipe: RecipeKind) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            recipe,
            state: PipelineState::Idle,
            context: StageContext::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Run id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Recipe being executed.
    #[must_use]
    pub fn recipe(&self) -> RecipeKind {
        self.recipe
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Stage results so far.
    #[must_use]
    pub fn context(&self) -> &StageContext {
        &self.context
    }

    /// When the run was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the run reached a terminal state.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Moves to `next`.
    pub fn transition(&mut self, next: PipelineState) -> Result<PipelineState, PostflowError> {
        self.ensure_open()?;
        let previous = self.state;
        self.state = next;
        Ok(previous)
    }

    /// Appends a stage result.
    pub fn record(&mut self, result: StageResult) -> Result<&StageResult, PostflowError> {
        self.ensure_open()?;
        Ok(self.context.append(result))
    }

    /// Enters a terminal state and freezes the run.
    pub fn finish(&mut self, terminal: PipelineState) -> Result<(), PostflowError> {
        self.ensure_open()?;
        if !terminal.is_terminal() {
            return Err(PostflowError::unrecoverable(format!(
                "{terminal} is not a terminal state"
            )));
        }
        self.state = terminal;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Serializable view of the run as it stands.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id,
            recipe: self.recipe,
            state: self.state,
            stages: self.context.entries().to_vec(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }

    fn ensure_open(&self) -> Result<(), PostflowError> {
        if self.is_finished() {
            return Err(PostflowError::unrecoverable(format!(
                "run {} already finished in {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}
