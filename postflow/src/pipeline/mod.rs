//! The recipe state machine.
//!
//! [`PipelineStateMachine`] walks a run through the states of its recipe's
//! [`TransitionTable`], executing working states through the stage handlers
//! and suspending at gating states until a reviewer answers.

mod handlers;
mod ledger;
mod machine;
mod outcome;
mod prompts;
mod run_context;
mod transitions;


pub use handlers::{PublishedPost, ReviewOutput, StageOutput, VisualOutput};
pub use ledger::{LedgerEntry, PublishLedger};
pub use machine::PipelineStateMachine;
pub use outcome::{RunFailure, RunOutcome};
pub use run_context::{ContentDraft, RunContext, RunInput};
pub use transitions::{StateEvent, TransitionTable, TEXT_REVIEW_ACTIONS};
