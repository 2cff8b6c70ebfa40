//! Human-in-the-loop approval.
//!
//! A gating state opens an [`ApprovalRequest`] on the run's
//! [`ApprovalGate`] and suspends until the external surface answers with an
//! [`ApprovalResponse`] or the timeout elapses.

mod gate;
mod registry;

pub use gate::{ApprovalGate, DEFAULT_APPROVAL_TIMEOUT};
pub use registry::ApprovalRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tag identifying an approval action without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    /// Accept and move on.
    Approve,
    /// Produce the stage output again.
    Regenerate,
    /// Produce it again following reviewer instructions.
    Edit,
    /// Produce it again on a different provider.
    ChangeProvider,
    /// Stop the run.
    Cancel,
    /// Nobody answered in time.
    Timeout,
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Regenerate => write!(f, "regenerate"),
            Self::Edit => write!(f, "edit"),
            Self::ChangeProvider => write!(f, "change_provider"),
            Self::Cancel => write!(f, "cancel"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

impl ActionTag {
    /// Actions offered at a normal review gate.
    pub const REVIEW: [Self; 5] = [
        Self::Approve,
        Self::Regenerate,
        Self::Edit,
        Self::ChangeProvider,
        Self::Cancel,
    ];

    /// Actions offered when a stage failed and a human decides what next.
    pub const FAILURE: [Self; 3] = [Self::Regenerate, Self::ChangeProvider, Self::Cancel];
}

/// A reviewer's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ApprovalAction {
    /// Accept and move on.
    Approve,
    /// Produce the stage output again.
    Regenerate,
    /// Produce it again following `instructions`.
    Edit {
        /// Reviewer guidance for the next attempt.
        instructions: String,
    },
    /// Produce it again on another provider.
    ChangeProvider {
        /// Candidate to try first; `None` means "anything but the last one".
        #[serde(default)]
        provider: Option<String>,
    },
    /// Stop the run.
    Cancel,
    /// Nobody answered in time.
    Timeout,
}

impl ApprovalAction {
    /// The payload-free tag for this action.
    #[must_use]
    pub fn tag(&self) -> ActionTag {
        match self {
            Self::Approve => ActionTag::Approve,
            Self::Regenerate => ActionTag::Regenerate,
            Self::Edit { .. } => ActionTag::Edit,
            Self::ChangeProvider { .. } => ActionTag::ChangeProvider,
            Self::Cancel => ActionTag::Cancel,
            Self::Timeout => ActionTag::Timeout,
        }
    }
}

/// Response delivered to a waiting gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    /// The decision.
    #[serde(flatten)]
    pub action: ApprovalAction,
    /// Who answered, if the surface knows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
}

impl ApprovalResponse {
    /// Wraps an action.
    #[must_use]
    pub fn new(action: ApprovalAction) -> Self {
        Self {
            action,
            responder: None,
        }
    }

    /// An approve response.
    #[must_use]
    pub fn approve() -> Self {
        Self::new(ApprovalAction::Approve)
    }

    /// A regenerate response.
    #[must_use]
    pub fn regenerate() -> Self {
        Self::new(ApprovalAction::Regenerate)
    }

    /// An edit response.
    #[must_use]
    pub fn edit(instructions: impl Into<String>) -> Self {
        Self::new(ApprovalAction::Edit {
            instructions: instructions.into(),
        })
    }

    /// A change-provider response.
    #[must_use]
    pub fn change_provider(provider: Option<String>) -> Self {
        Self::new(ApprovalAction::ChangeProvider { provider })
    }

    /// A cancel response.
    #[must_use]
    pub fn cancel() -> Self {
        Self::new(ApprovalAction::Cancel)
    }

    /// The response produced when the gate times out.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ApprovalAction::Timeout)
    }

    /// Records who answered.
    #[must_use]
    pub fn with_responder(mut self, responder: impl Into<String>) -> Self {
        self.responder = Some(responder.into());
        self
    }
}

/// An outstanding (or resolved) request for a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request id.
    pub id: Uuid,
    /// Gating stage that opened the request.
    pub stage: String,
    /// What the reviewer is shown.
    pub prompt: serde_json::Value,
    /// Actions the reviewer may answer with.
    pub allowed_actions: Vec<ActionTag>,
    /// When the request was opened.
    pub created_at: DateTime<Utc>,
    /// When the request times out.
    pub deadline: DateTime<Utc>,
    /// How it was resolved, once it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ActionTag>,
}

impl ApprovalRequest {
    /// Returns true if `tag` is an acceptable answer.
    #[must_use]
    pub fn allows(&self, tag: ActionTag) -> bool {
        self.allowed_actions.contains(&tag)
    }
}
