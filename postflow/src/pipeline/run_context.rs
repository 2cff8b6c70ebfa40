//! Per-run input and working memory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::handlers::StageOutput;
use crate::config::PipelineConfig;
use crate::core::{ArtifactRef, RecipeKind};
use crate::providers::{AspectRatio, RouteOptions};
use crate::quality::QualityScore;

/// What a trigger asks a run to make.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    /// Topic suggestion passed to planning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_hint: Option<String>,
    /// Platforms to publish to; empty means the configured defaults.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Framing; `None` means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<AspectRatio>,
    /// Video length in seconds; `None` means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration: Option<f64>,
    /// Free-form notes for the writers (brand, audience, tone).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl RunInput {
    /// Creates an empty input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suggests a topic.
    #[must_use]
    pub fn with_topic_hint(mut self, hint: impl Into<String>) -> Self {
        self.topic_hint = Some(hint.into());
        self
    }

    /// Adds a target platform.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platforms.push(platform.into());
        self
    }

    /// Sets the framing.
    #[must_use]
    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        self.aspect = Some(aspect);
        self
    }

    /// Sets the video length.
    #[must_use]
    pub fn with_target_duration(mut self, seconds: f64) -> Self {
        self.target_duration = Some(seconds);
        self
    }

    /// Adds a writer note.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Written material for a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDraft {
    /// Post caption.
    pub caption: String,
    /// Narration for video recipes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Spoken line for the conversational dialog clip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog: Option<String>,
    /// Scene beats guiding segment prompts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beats: Vec<String>,
}

/// Working memory of one run, owned by the state machine.
///
/// Stage handlers read it; only the machine writes it, by applying the
/// handlers' outputs and the reviewers' answers.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Run this context belongs to.
    pub run_id: Uuid,
    /// Recipe being executed.
    pub recipe: RecipeKind,
    /// Original input.
    pub input: RunInput,
    /// Resolved target platforms.
    pub platforms: Vec<String>,
    /// Resolved framing.
    pub aspect: AspectRatio,
    /// Resolved video length.
    pub target_duration: f64,
    /// Chosen topic.
    pub topic: Option<String>,
    /// Latest written content.
    pub content: Option<ContentDraft>,
    /// Latest visual.
    pub visual: Option<ArtifactRef>,
    /// Candidate that produced the latest visual.
    pub visual_provider: Option<String>,
    /// Latest quality score.
    pub quality: Option<QualityScore>,
    /// Reviewer instructions for the next producing stage.
    pub instructions: Option<String>,
    /// Candidate preferences for the next visual.
    pub route: RouteOptions,
}

impl RunContext {
    /// Creates the context for a new run, filling gaps from `config`.
    #[must_use]
    pub fn new(run_id: Uuid, recipe: RecipeKind, input: RunInput, config: &PipelineConfig) -> Self {
        let platforms = if input.platforms.is_empty() {
            config.default_platforms.clone()
        } else {
            input.platforms.clone()
        };
        Self {
            run_id,
            recipe,
            platforms,
            aspect: input.aspect.unwrap_or(config.default_aspect),
            target_duration: input.target_duration.unwrap_or(config.default_video_secs),
            input,
            topic: None,
            content: None,
            visual: None,
            visual_provider: None,
            quality: None,
            instructions: None,
            route: RouteOptions::default(),
        }
    }

    /// Caption of the latest draft.
    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        self.content.as_ref().map(|c| c.caption.as_str())
    }

    /// Narration of the latest draft.
    #[must_use]
    pub fn script(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.script.as_deref())
    }

    /// Folds a stage's output into the working memory.
    pub fn apply(&mut self, output: &StageOutput) {
        match output {
            StageOutput::Topic { topic } => {
                self.topic = Some(topic.clone());
                self.instructions = None;
            }
            StageOutput::Content(draft) => {
                self.content = Some(draft.clone());
                self.instructions = None;
            }
            StageOutput::Visual(visual) => {
                self.visual = Some(visual.artifact.clone());
                self.visual_provider = visual.providers.first().cloned();
                self.instructions = None;
            }
            StageOutput::Review(review) => {
                if let (Some(text), Some(content)) = (&review.revised_caption, self.content.as_mut()) {
                    content.caption = text.clone();
                }
                self.quality = Some(review.score.clone());
            }
            StageOutput::Published(_) => {}
        }
    }

    /// Records reviewer instructions for the next producing stage.
    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.instructions = Some(instructions.into());
    }

    /// Steers the next visual away from the last candidate.
    ///
    /// With an explicit `requested` id that candidate goes first; otherwise
    /// the candidate that produced the last visual is excluded.
    pub fn switch_provider(&mut self, requested: Option<String>) {
        match requested {
            Some(id) => {
                self.route.excluded.retain(|e| *e != id);
                self.route.preferred = Some(id);
            }
            None => {
                if let Some(last) = self.visual_provider.clone() {
                    if self.route.preferred.as_deref() == Some(last.as_str()) {
                        self.route.preferred = None;
                    }
                    if !self.route.excluded.contains(&last) {
                        self.route.excluded.push(last);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::handlers::{ReviewOutput, VisualOutput};

    fn ctx() -> RunContext {
        RunContext::new(
            Uuid::new_v4(),
            RecipeKind::Interactive,
            RunInput::new().with_topic_hint("harbor mornings"),
            &PipelineConfig::default(),
        )
    }

    #[test]
    fn test_defaults_come_from_config() {
        let ctx = ctx();
        assert_eq!(ctx.platforms, vec!["instagram"]);
        assert_eq!(ctx.aspect, AspectRatio::Portrait);
        assert_eq!(ctx.target_duration, 30.0);

        let explicit = RunContext::new(
            Uuid::new_v4(),
            RecipeKind::LongForm,
            RunInput::new().with_platform("tiktok").with_target_duration(45.0),
            &PipelineConfig::default(),
        );
        assert_eq!(explicit.platforms, vec!["tiktok"]);
        assert_eq!(explicit.target_duration, 45.0);
    }

    #[test]
    fn test_apply_consumes_instructions() {
        let mut ctx = ctx();
        ctx.set_instructions("shorter");
        ctx.apply(&StageOutput::Topic {
            topic: "tide pools".to_string(),
        });
        assert_eq!(ctx.topic.as_deref(), Some("tide pools"));
        assert!(ctx.instructions.is_none());
    }

    #[test]
    fn test_revised_caption_replaces_draft() {
        let mut ctx = ctx();
        ctx.apply(&StageOutput::Content(ContentDraft {
            caption: "first".to_string(),
            ..ContentDraft::default()
        }));
        ctx.apply(&StageOutput::Review(ReviewOutput {
            score: QualityScore::uniform(7.5),
            passed: true,
            revised_caption: Some("second".to_string()),
            revisions: 1,
        }));
        assert_eq!(ctx.caption(), Some("second"));
        assert_eq!(ctx.quality.as_ref().map(|q| q.aggregate), Some(7.5));
    }

    #[test]
    fn test_switch_provider() {
        let mut ctx = ctx();
        ctx.apply(&StageOutput::Visual(VisualOutput::single(
            ArtifactRef::image("a.png"),
            "image-a",
            Vec::new(),
        )));

        ctx.switch_provider(None);
        assert_eq!(ctx.route.excluded, vec!["image-a"]);

        ctx.switch_provider(Some("image-a".to_string()));
        assert!(ctx.route.excluded.is_empty());
        assert_eq!(ctx.route.preferred.as_deref(), Some("image-a"));
    }
}
