//! # Postflow
//!
//! An orchestrator that takes a short-form social post from idea to
//! publication: topic, caption or script, image or narrated video, quality
//! review and publishing, with optional human approval in between.
//!
//! Postflow provides:
//!
//! - **Recipes**: four fixed state orders (interactive, autonomous,
//!   long-form, conversational) driven by one [`PipelineStateMachine`](pipeline::PipelineStateMachine)
//! - **Human-in-the-loop gates**: suspend a run until a reviewer approves,
//!   regenerates, edits, switches provider or cancels
//! - **Provider fallback**: ordered candidate chains with per-call timeouts
//! - **Segment assembly**: long videos from parallel clip jobs, retried and
//!   crossfaded
//! - **Duration reconciliation**: narration fitted to the video it covers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use postflow::prelude::*;
//!
//! let ports = StagePorts::new(text, media, editor, publisher, scorer)
//!     .with_speech(speech)
//!     .with_notifier(chat);
//! let machine = PipelineStateMachine::new(ports, candidates, PipelineConfig::default());
//!
//! let outcome = machine
//!     .run(RecipeKind::Autonomous, RunInput::new().with_topic_hint("tide pools"))
//!     .await;
//! assert!(outcome.success);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod approval;
pub mod assembly;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod quality;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::approval::{
        ActionTag, ApprovalAction, ApprovalGate, ApprovalRegistry, ApprovalRequest,
        ApprovalResponse,
    };
    pub use crate::config::PipelineConfig;
    pub use crate::context::{Run, RunSnapshot, StageContext};
    pub use crate::core::{ArtifactKind, ArtifactRef, PipelineState, RecipeKind, RunEvent};
    pub use crate::errors::{PostflowError, ProviderError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{PipelineStateMachine, RunFailure, RunInput, RunOutcome};
    pub use crate::providers::{
        AspectRatio, Capability, CapabilityTable, FallbackRouter, GenerationSpec,
        ProviderCandidate,
    };
    pub use crate::scheduler::{RecipeTrigger, ScheduleEntry, Scheduler};
    pub use crate::stages::{
        MediaEditor, MediaGenerator, Notifier, Publisher, QualityScorer, SpeechSynthesizer,
        StagePorts, StageResult, SynthesizedAudio, TextGenerator,
    };
}
