//! Error types for the postflow orchestrator.
//!
//! The top-level [`PostflowError`] follows the pipeline's failure taxonomy:
//! provider errors and timeouts are recoverable through fallback, quality
//! rejections end the stage, approval timeouts behave like a cancel, and
//! everything else is unrecoverable for the run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for postflow operations.
#[derive(Debug, Clone, Error)]
pub enum PostflowError {
    /// A collaborator reported an explicit failure.
    #[error("{0}")]
    Provider(ProviderError),

    /// A collaborator did not answer in time.
    #[error("{0}")]
    ProviderTimeout(ProviderError),

    /// Every routing candidate failed.
    #[error("{0}")]
    Router(#[from] RouterError),

    /// Segment assembly could not produce a usable video.
    #[error("{0}")]
    Assembly(#[from] AssemblyError),

    /// Duration reconciliation failed.
    #[error("{0}")]
    Reconcile(#[from] ReconcileError),

    /// Generated text stayed below the quality threshold.
    #[error("Quality rejected: aggregate {aggregate:.2} below {threshold:.2} after {revisions} revision(s)")]
    QualityRejected {
        /// Last aggregate score.
        aggregate: f64,
        /// Acceptance threshold.
        threshold: f64,
        /// Revisions attempted.
        revisions: usize,
    },

    /// Nobody answered an approval request.
    #[error("Approval timeout at {stage} after {timeout_seconds}s")]
    ApprovalTimeout {
        /// Gating state that timed out.
        stage: String,
        /// Timeout that elapsed.
        timeout_seconds: f64,
    },

    /// The approval gate already has an outstanding request.
    #[error("{0}")]
    GateBusy(#[from] GateBusy),

    /// Another run is already executing on this pipeline instance.
    #[error("Pipeline is already running (active run: {active_run})")]
    AlreadyRunning {
        /// The run currently holding the pipeline.
        active_run: String,
    },

    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Any other failure; terminal for the run.
    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),
}

impl From<ProviderError> for PostflowError {
    fn from(err: ProviderError) -> Self {
        if err.is_timeout() {
            Self::ProviderTimeout(err)
        } else {
            Self::Provider(err)
        }
    }
}

impl PostflowError {
    /// Creates an unrecoverable error.
    #[must_use]
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Unrecoverable(message.into())
    }

    /// Stable tag used in outcomes and observer events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(_) | Self::Router(_) | Self::Assembly(_) => "provider_error",
            Self::ProviderTimeout(_) => "provider_timeout",
            Self::Reconcile(ReconcileError::Trim(e)) => match e.kind {
                ProviderErrorKind::Failed => "provider_error",
                ProviderErrorKind::Timeout => "provider_timeout",
            },
            Self::QualityRejected { .. } => "quality_rejected",
            Self::ApprovalTimeout { .. } => "approval_timeout",
            Self::Reconcile(_)
            | Self::GateBusy(_)
            | Self::AlreadyRunning { .. }
            | Self::Config(_)
            | Self::Unrecoverable(_) => "unrecoverable",
        }
    }

    /// Returns true if a human (or a different provider) could still rescue
    /// the stage that produced this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_)
                | Self::ProviderTimeout(_)
                | Self::Router(_)
                | Self::Assembly(_)
                | Self::Reconcile(ReconcileError::Trim(_))
        )
    }

    /// Converts to a dictionary representation for observer events.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("recoverable".to_string(), serde_json::json!(self.is_recoverable()));
        map
    }
}

/// How a collaborator call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The collaborator returned an error.
    Failed,
    /// The call exceeded its deadline.
    Timeout,
}

/// Failure reported by a collaborator (generator, synthesizer, editor, publisher).
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{source_id}: {message}")]
pub struct ProviderError {
    /// Id of the collaborator or candidate that failed.
    pub source_id: String,
    /// Failure description.
    pub message: String,
    /// Failure kind.
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    /// Creates an explicit failure.
    #[must_use]
    pub fn failed(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            message: message.into(),
            kind: ProviderErrorKind::Failed,
        }
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(source_id: impl Into<String>, timeout_seconds: f64) -> Self {
        Self {
            source_id: source_id.into(),
            message: format!("timed out after {timeout_seconds}s"),
            kind: ProviderErrorKind::Timeout,
        }
    }

    /// Returns true for timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == ProviderErrorKind::Timeout
    }
}

/// Errors from the provider fallback router.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// No candidate is eligible for the request.
    #[error("No eligible candidates for {capability}")]
    NoCandidates {
        /// Requested capability.
        capability: String,
    },

    /// Every eligible candidate failed.
    #[error("All candidates failed for {capability} (tried: {}): {last_error}", attempted.join(", "))]
    Exhausted {
        /// Requested capability.
        capability: String,
        /// Candidate ids in the order they were tried.
        attempted: Vec<String>,
        /// Error from the last candidate.
        last_error: ProviderError,
    },
}

/// Errors from segment assembly.
#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    /// Too few segments survived the retry rounds.
    #[error("Only {succeeded} of {planned} segments generated (need at least {required})")]
    InsufficientSegments {
        /// Segments generated successfully.
        succeeded: usize,
        /// Minimum needed to proceed.
        required: usize,
        /// Segments planned.
        planned: usize,
    },

    /// The segment plan could not be built.
    #[error("Invalid segment plan: {0}")]
    Plan(String),

    /// Probing or concatenating clips failed.
    #[error("Media editing failed: {0}")]
    Editor(ProviderError),
}

/// Errors from duration reconciliation.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Trimming the audio track failed.
    #[error("Audio trim failed: {0}")]
    Trim(ProviderError),

    /// Durations were not finite positive numbers.
    #[error("Invalid durations: audio={audio}s video={video}s")]
    InvalidDurations {
        /// Audio duration.
        audio: f64,
        /// Video duration.
        video: f64,
    },
}

/// Raised when a second wait is attempted on a gate that already has one.
#[derive(Debug, Clone, Error)]
#[error("Approval gate already has a pending request ({request_id})")]
pub struct GateBusy {
    /// The outstanding request.
    pub request_id: String,
}

/// Invalid configuration value.
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration for '{field}': {reason}")]
pub struct ConfigError {
    /// Offending field.
    pub field: String,
    /// Why it was rejected.
    pub reason: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
