//! Pipeline states and recipe kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The states a run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Not running. Also where cancelled or timed-out runs end up.
    Idle,
    /// Choosing a topic.
    Planning,
    /// Waiting for a human to accept the topic.
    AwaitingTopicApproval,
    /// Writing caption and scripts.
    CreatingContent,
    /// Waiting for a human to accept the written content.
    AwaitingContentApproval,
    /// Generating images or video.
    CreatingVisual,
    /// Waiting for a human to accept the visual.
    AwaitingVisualApproval,
    /// Running the quality gate.
    Reviewing,
    /// Waiting for the go-ahead to publish.
    AwaitingFinalApproval,
    /// Pushing to social platforms.
    Publishing,
    /// Published successfully.
    Completed,
    /// Aborted on an error.
    Error,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Planning => "PLANNING",
            Self::AwaitingTopicApproval => "AWAITING_TOPIC_APPROVAL",
            Self::CreatingContent => "CREATING_CONTENT",
            Self::AwaitingContentApproval => "AWAITING_CONTENT_APPROVAL",
            Self::CreatingVisual => "CREATING_VISUAL",
            Self::AwaitingVisualApproval => "AWAITING_VISUAL_APPROVAL",
            Self::Reviewing => "REVIEWING",
            Self::AwaitingFinalApproval => "AWAITING_FINAL_APPROVAL",
            Self::Publishing => "PUBLISHING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

impl PipelineState {
    /// Returns true for states that end a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Idle)
    }

    /// Returns true for states that block on the approval gate.
    #[must_use]
    pub fn is_gate(&self) -> bool {
        matches!(
            self,
            Self::AwaitingTopicApproval
                | Self::AwaitingContentApproval
                | Self::AwaitingVisualApproval
                | Self::AwaitingFinalApproval
        )
    }

    /// The working state whose output a gate reviews.
    #[must_use]
    pub fn producing_state(&self) -> Option<Self> {
        match self {
            Self::AwaitingTopicApproval => Some(Self::Planning),
            Self::AwaitingContentApproval => Some(Self::CreatingContent),
            Self::AwaitingVisualApproval => Some(Self::CreatingVisual),
            Self::AwaitingFinalApproval => Some(Self::Reviewing),
            _ => None,
        }
    }

    /// Stage name recorded in the stage context for this state's work.
    #[must_use]
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "plan_topic",
            Self::AwaitingTopicApproval => "topic_approval",
            Self::CreatingContent => "create_content",
            Self::AwaitingContentApproval => "content_approval",
            Self::CreatingVisual => "create_visual",
            Self::AwaitingVisualApproval => "visual_approval",
            Self::Reviewing => "quality_review",
            Self::AwaitingFinalApproval => "final_approval",
            Self::Publishing => "publish",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// The run recipes the state machine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    /// Every stage gated on a human.
    Interactive,
    /// No gates; bounded quality loop.
    Autonomous,
    /// Multi-segment narrated video.
    LongForm,
    /// Dialog clip plus narrated B-roll, one approval.
    Conversational,
}

impl fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
            Self::Autonomous => write!(f, "autonomous"),
            Self::LongForm => write!(f, "long_form"),
            Self::Conversational => write!(f, "conversational"),
        }
    }
}

impl RecipeKind {
    /// Returns true if the recipe ever waits on a human.
    #[must_use]
    pub fn has_gates(&self) -> bool {
        !matches!(self, Self::Autonomous)
    }

    /// Returns true if the recipe produces video rather than an image.
    #[must_use]
    pub fn produces_video(&self) -> bool {
        matches!(self, Self::LongForm | Self::Conversational)
    }
}
