//! Testing utilities for postflow runs.
//!
//! This module provides:
//! - Scripted doubles for every collaborator port
//! - A harness that wires them into a state machine
//! - Assertions over run outcomes

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_cancelled, assert_completed, assert_failed_with, assert_final_state, assert_stages,
};
pub use fixtures::{answer, candidates, fast_config, next_approval, TestHarness};
pub use mocks::{
    Notification, PublishCall, RecordingNotifier, ScriptedEditor, ScriptedMediaGenerator,
    ScriptedPublisher, ScriptedScorer, ScriptedSpeech, ScriptedTextGenerator, DEFAULT_SCRIPT,
};
