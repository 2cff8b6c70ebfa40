//! Per-recipe transition tables.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::approval::{ActionTag, ApprovalAction};
use crate::core::{PipelineState, RecipeKind};
use PipelineState::{
    AwaitingContentApproval, AwaitingFinalApproval, AwaitingTopicApproval, AwaitingVisualApproval,
    Completed, CreatingContent, CreatingVisual, Error, Idle, Planning, Publishing, Reviewing,
};

/// Actions offered at gates that review text (topic, written content).
pub const TEXT_REVIEW_ACTIONS: [ActionTag; 4] = [
    ActionTag::Approve,
    ActionTag::Regenerate,
    ActionTag::Edit,
    ActionTag::Cancel,
];

/// Something that happened in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEvent {
    /// The working stage produced its output.
    StageSucceeded,
    /// The working stage failed and the run cannot continue.
    StageFailed,
    /// Reviewer accepted.
    Approve,
    /// Reviewer asked for another attempt (or a retry after a failure).
    Regenerate,
    /// Reviewer asked for another attempt with instructions.
    Edit,
    /// Reviewer asked for a different backend.
    ChangeProvider,
    /// Reviewer stopped the run.
    Cancel,
    /// Nobody answered in time.
    Timeout,
    /// The quality gate spent its revision budget.
    QualityRejected,
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StageSucceeded => "stage_succeeded",
            Self::StageFailed => "stage_failed",
            Self::Approve => "approve",
            Self::Regenerate => "regenerate",
            Self::Edit => "edit",
            Self::ChangeProvider => "change_provider",
            Self::Cancel => "cancel",
            Self::Timeout => "timeout",
            Self::QualityRejected => "quality_rejected",
        };
        f.write_str(name)
    }
}

impl From<&ApprovalAction> for StateEvent {
    fn from(action: &ApprovalAction) -> Self {
        match action {
            ApprovalAction::Approve => Self::Approve,
            ApprovalAction::Regenerate => Self::Regenerate,
            ApprovalAction::Edit { .. } => Self::Edit,
            ApprovalAction::ChangeProvider { .. } => Self::ChangeProvider,
            ApprovalAction::Cancel => Self::Cancel,
            ApprovalAction::Timeout => Self::Timeout,
        }
    }
}

const INTERACTIVE: &[PipelineState] = &[
    Planning,
    AwaitingTopicApproval,
    CreatingContent,
    AwaitingContentApproval,
    CreatingVisual,
    AwaitingVisualApproval,
    Reviewing,
    AwaitingFinalApproval,
    Publishing,
    Completed,
];

const AUTONOMOUS: &[PipelineState] = &[
    Planning,
    CreatingContent,
    CreatingVisual,
    Reviewing,
    Publishing,
    Completed,
];

const LONG_FORM: &[PipelineState] = &[
    Planning,
    AwaitingTopicApproval,
    CreatingContent,
    CreatingVisual,
    AwaitingVisualApproval,
    Reviewing,
    AwaitingFinalApproval,
    Publishing,
    Completed,
];

const CONVERSATIONAL: &[PipelineState] = &[
    Planning,
    CreatingContent,
    CreatingVisual,
    Reviewing,
    AwaitingFinalApproval,
    Publishing,
    Completed,
];

/// The fixed state order of one recipe and the moves allowed from each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTable {
    recipe: RecipeKind,
    order: &'static [PipelineState],
}

impl TransitionTable {
    /// The table for `recipe`.
    #[must_use]
    pub fn for_recipe(recipe: RecipeKind) -> Self {
        let order = match recipe {
            RecipeKind::Interactive => INTERACTIVE,
            RecipeKind::Autonomous => AUTONOMOUS,
            RecipeKind::LongForm => LONG_FORM,
            RecipeKind::Conversational => CONVERSATIONAL,
        };
        Self { recipe, order }
    }

    /// Recipe this table belongs to.
    #[must_use]
    pub fn recipe(&self) -> RecipeKind {
        self.recipe
    }

    /// First working state.
    #[must_use]
    pub fn initial(&self) -> PipelineState {
        Planning
    }

    /// States on the happy path, in order.
    #[must_use]
    pub fn states(&self) -> &'static [PipelineState] {
        self.order
    }

    /// Returns true if the recipe ever enters `state`.
    #[must_use]
    pub fn contains(&self, state: PipelineState) -> bool {
        self.order.contains(&state)
    }

    /// Actions a reviewer may answer with at `gate`.
    #[must_use]
    pub fn allowed_actions(&self, gate: PipelineState) -> &'static [ActionTag] {
        match gate {
            AwaitingTopicApproval | AwaitingContentApproval => &TEXT_REVIEW_ACTIONS,
            AwaitingVisualApproval | AwaitingFinalApproval => &ActionTag::REVIEW,
            _ => &ActionTag::FAILURE,
        }
    }

    /// The state after `event` in `state`, or `None` if the move is illegal.
    #[must_use]
    pub fn next(&self, state: PipelineState, event: StateEvent) -> Option<PipelineState> {
        if !self.contains(state) || state == Completed {
            return None;
        }

        match event {
            StateEvent::Cancel | StateEvent::Timeout => Some(Idle),
            StateEvent::StageSucceeded if !state.is_gate() => self.successor(state),
            StateEvent::StageFailed if !state.is_gate() => Some(Error),
            StateEvent::QualityRejected if state == Reviewing => Some(Error),
            StateEvent::Approve if state.is_gate() => self.successor(state),
            StateEvent::Regenerate | StateEvent::Edit | StateEvent::ChangeProvider => {
                self.revision_target(state, event)
            }
            _ => None,
        }
    }

    fn successor(&self, state: PipelineState) -> Option<PipelineState> {
        let pos = self.order.iter().position(|s| *s == state)?;
        self.order.get(pos + 1).copied()
    }

    fn revision_target(&self, state: PipelineState, event: StateEvent) -> Option<PipelineState> {
        let target = match (state, event) {
            // retry after a failed working stage
            (working, StateEvent::Regenerate | StateEvent::ChangeProvider) if !working.is_gate() => {
                working
            }
            (AwaitingFinalApproval, StateEvent::ChangeProvider) => CreatingVisual,
            (AwaitingFinalApproval, _) => CreatingContent,
            (AwaitingTopicApproval | AwaitingContentApproval, StateEvent::ChangeProvider) => {
                return None
            }
            (gate, _) if gate.is_gate() => gate.producing_state()?,
            _ => return None,
        };
        self.contains(target).then_some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn walk(table: &TransitionTable) -> Vec<PipelineState> {
        let mut state = table.initial();
        let mut path = vec![state];
        while state != Completed {
            let event = if state.is_gate() {
                StateEvent::Approve
            } else {
                StateEvent::StageSucceeded
            };
            state = table.next(state, event).unwrap();
            path.push(state);
        }
        path
    }

    #[test]
    fn test_happy_paths_follow_recipe_order() {
        for recipe in [
            RecipeKind::Interactive,
            RecipeKind::Autonomous,
            RecipeKind::LongForm,
            RecipeKind::Conversational,
        ] {
            let table = TransitionTable::for_recipe(recipe);
            assert_eq!(walk(&table), table.states().to_vec(), "{recipe}");
        }
    }

    #[test]
    fn test_autonomous_has_no_gates() {
        let table = TransitionTable::for_recipe(RecipeKind::Autonomous);
        assert!(table.states().iter().all(|s| !s.is_gate()));
        assert_eq!(table.next(Reviewing, StateEvent::QualityRejected), Some(Error));
        assert_eq!(table.next(Planning, StateEvent::Approve), None);
    }

    #[test]
    fn test_gates_route_back_to_producers() {
        let table = TransitionTable::for_recipe(RecipeKind::Interactive);
        assert_eq!(table.next(AwaitingTopicApproval, StateEvent::Regenerate), Some(Planning));
        assert_eq!(table.next(AwaitingContentApproval, StateEvent::Edit), Some(CreatingContent));
        assert_eq!(
            table.next(AwaitingVisualApproval, StateEvent::ChangeProvider),
            Some(CreatingVisual)
        );
        assert_eq!(table.next(AwaitingFinalApproval, StateEvent::Edit), Some(CreatingContent));
        assert_eq!(
            table.next(AwaitingFinalApproval, StateEvent::ChangeProvider),
            Some(CreatingVisual)
        );
        assert_eq!(table.next(AwaitingTopicApproval, StateEvent::ChangeProvider), None);
    }

    #[test]
    fn test_cancel_and_timeout_go_idle() {
        let table = TransitionTable::for_recipe(RecipeKind::LongForm);
        assert_eq!(table.next(AwaitingVisualApproval, StateEvent::Cancel), Some(Idle));
        assert_eq!(table.next(CreatingVisual, StateEvent::Timeout), Some(Idle));
    }

    #[test]
    fn test_failed_stage_can_be_retried() {
        let table = TransitionTable::for_recipe(RecipeKind::Conversational);
        assert_eq!(table.next(CreatingVisual, StateEvent::Regenerate), Some(CreatingVisual));
        assert_eq!(table.next(CreatingVisual, StateEvent::StageFailed), Some(Error));
        assert_eq!(table.next(CreatingVisual, StateEvent::Edit), None);
    }

    #[test]
    fn test_states_outside_recipe_are_rejected() {
        let table = TransitionTable::for_recipe(RecipeKind::Conversational);
        assert!(!table.contains(AwaitingTopicApproval));
        assert_eq!(table.next(AwaitingTopicApproval, StateEvent::Approve), None);
        assert_eq!(table.next(Completed, StateEvent::Cancel), None);
    }

    #[test]
    fn test_allowed_actions() {
        let table = TransitionTable::for_recipe(RecipeKind::Interactive);
        assert!(!table.allowed_actions(AwaitingTopicApproval).contains(&ActionTag::ChangeProvider));
        assert!(table.allowed_actions(AwaitingFinalApproval).contains(&ActionTag::ChangeProvider));
        assert_eq!(table.allowed_actions(CreatingVisual), &ActionTag::FAILURE);
    }
}
