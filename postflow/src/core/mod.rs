//! Core domain model types for postflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Pipeline states and recipe kinds
//! - Artifact references passed between collaborators
//! - Run lifecycle events

mod artifact;
mod event;
mod state;

pub use artifact::{ArtifactKind, ArtifactRef};
pub use event::RunEvent;
pub use state::{PipelineState, RecipeKind};
