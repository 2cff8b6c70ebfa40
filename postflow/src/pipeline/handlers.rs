//! Stage handlers.
//!
//! Each working state maps to one handler. Handlers read the
//! [`RunContext`], call collaborators and return a [`StageOutput`]; the
//! state machine records the output and folds it into the context.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ledger::PublishLedger;
use super::prompts;
use super::run_context::{ContentDraft, RunContext};
use crate::assembly::{AssembledVideo, SegmentAssembler, SegmentPlan};
use crate::config::PipelineConfig;
use crate::core::{ArtifactRef, PipelineState, RecipeKind};
use crate::errors::{ConfigError, PostflowError, ProviderError, RouterError};
use crate::providers::{Capability, FallbackRouter, GenerationSpec, RouteOptions};
use crate::quality::{QualityGate, QualityScore};
use crate::reconcile::{split_sentences, target_words, DurationReconciler, SyncDecision};
use crate::stages::ports::{StagePorts, SynthesizedAudio};

/// Share of a conversational video given to the on-camera dialog.
const DIALOG_SHARE: f64 = 0.4;

/// A generated visual and how it was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualOutput {
    /// Final image or video.
    pub artifact: ArtifactRef,
    /// Video length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Candidates that produced the clips, in timeline order.
    pub providers: Vec<String>,
    /// Candidates that failed before a success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_from: Vec<String>,
    /// Narration reconciliation, one per narrated clip.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync: Vec<SyncDecision>,
    /// Segment assembly details for long-form video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly: Option<AssembledVideo>,
}

impl VisualOutput {
    /// A visual produced by one generation job.
    #[must_use]
    pub fn single(artifact: ArtifactRef, provider: impl Into<String>, fallback_from: Vec<String>) -> Self {
        Self {
            duration: artifact.duration,
            artifact,
            providers: vec![provider.into()],
            fallback_from,
            sync: Vec::new(),
            assembly: None,
        }
    }

    /// Warnings raised while reconciling narration.
    #[must_use]
    pub fn warnings(&self) -> Vec<&str> {
        self.sync.iter().filter_map(|d| d.warning.as_deref()).collect()
    }
}

/// Quality review result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutput {
    /// Final score.
    pub score: QualityScore,
    /// Whether the score met the threshold.
    pub passed: bool,
    /// Caption after automatic revisions, if any were made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_caption: Option<String>,
    /// Automatic revisions made.
    pub revisions: usize,
}

/// One platform publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    /// Platform name.
    pub platform: String,
    /// Remote post id.
    pub remote_id: String,
    /// Whether an earlier attempt had already published it.
    pub reused: bool,
}

/// What a working stage produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// Planning chose a topic.
    Topic {
        /// The topic.
        topic: String,
    },
    /// Written content.
    Content(ContentDraft),
    /// Image or video.
    Visual(VisualOutput),
    /// Quality review.
    Review(ReviewOutput),
    /// Publications.
    Published(Vec<PublishedPost>),
}

impl StageOutput {
    /// JSON payload stored in the stage context.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            Self::Topic { topic } => Ok(serde_json::json!({ "topic": topic })),
            Self::Content(draft) => serde_json::to_value(draft),
            Self::Visual(visual) => serde_json::to_value(visual),
            Self::Review(review) => serde_json::to_value(review),
            Self::Published(posts) => Ok(serde_json::json!({ "posts": posts })),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Artifact worth previewing to a reviewer.
    #[must_use]
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match self {
            Self::Visual(visual) => Some(&visual.artifact),
            _ => None,
        }
    }
}

/// One narrated clip of a conversational video.
#[derive(Debug)]
struct PhaseClip {
    artifact: ArtifactRef,
    duration: f64,
    provider: String,
    fallback_from: Vec<String>,
    sync: SyncDecision,
}

/// Runs the working stages against the collaborators.
pub(crate) struct StageHandlers {
    ports: StagePorts,
    router: FallbackRouter,
    assembler: SegmentAssembler,
    reconciler: DurationReconciler,
    quality: QualityGate,
    config: PipelineConfig,
}

impl std::fmt::Debug for StageHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandlers")
            .field("ports", &self.ports)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

fn missing(what: &str) -> PostflowError {
    PostflowError::unrecoverable(format!("{what} is not available yet"))
}

impl StageHandlers {
    pub(crate) fn new(ports: StagePorts, router: FallbackRouter, config: PipelineConfig) -> Self {
        let assembler = SegmentAssembler::new(router.clone(), ports.media.clone(), ports.editor.clone())
            .with_config(config.assembly.clone());
        let reconciler = DurationReconciler::new(ports.editor.clone())
            .with_speech(ports.speech.clone())
            .with_thresholds(config.reconcile)
            .with_words_per_second(config.words_per_second);
        let quality = QualityGate::new(ports.scorer.clone()).with_config(config.quality);
        Self {
            ports,
            router,
            assembler,
            reconciler,
            quality,
            config,
        }
    }

    pub(crate) fn ports(&self) -> &StagePorts {
        &self.ports
    }

    fn text_timeout(&self) -> Duration {
        self.config.text_timeout()
    }

    /// Runs the handler for `state`.
    pub(crate) async fn execute(
        &self,
        state: PipelineState,
        ctx: &RunContext,
        ledger: &PublishLedger,
    ) -> Result<StageOutput, PostflowError> {
        match state {
            PipelineState::Planning => self.plan_topic(ctx).await,
            PipelineState::CreatingContent => self.create_content(ctx).await,
            PipelineState::CreatingVisual => match ctx.recipe {
                RecipeKind::LongForm => self.long_form_visual(ctx).await,
                RecipeKind::Conversational => self.conversational_visual(ctx).await,
                RecipeKind::Interactive | RecipeKind::Autonomous => self.image_visual(ctx).await,
            },
            PipelineState::Reviewing => self.review(ctx).await,
            PipelineState::Publishing => self.publish(ctx, ledger).await,
            other => Err(PostflowError::unrecoverable(format!(
                "{other} has no stage handler"
            ))),
        }
    }

    async fn write(&self, prompt: &str) -> Result<String, PostflowError> {
        let text = self.ports.text.generate(prompt, self.text_timeout()).await?;
        prompts::non_empty(&text)
            .ok_or_else(|| ProviderError::failed("text", "empty response").into())
    }

    async fn plan_topic(&self, ctx: &RunContext) -> Result<StageOutput, PostflowError> {
        let text = self.write(&prompts::topic(ctx)).await?;
        let topic = prompts::first_line(&text)
            .ok_or_else(|| PostflowError::from(ProviderError::failed("text", "no topic in response")))?;
        info!(topic = %topic, "Topic planned");
        Ok(StageOutput::Topic { topic })
    }

    async fn create_content(&self, ctx: &RunContext) -> Result<StageOutput, PostflowError> {
        let topic = ctx.topic.as_deref().ok_or_else(|| missing("topic"))?;
        let wps = self.config.words_per_second;
        let mut draft = ContentDraft {
            caption: self.write(&prompts::caption(ctx, topic)).await?,
            ..ContentDraft::default()
        };

        match ctx.recipe {
            RecipeKind::LongForm => {
                let seconds = ctx.target_duration;
                let script = self
                    .write(&prompts::narration(ctx, topic, seconds, target_words(seconds, wps)))
                    .await?;
                draft.beats = split_sentences(&script);
                draft.script = Some(script);
            }
            RecipeKind::Conversational => {
                let (dialog_secs, broll_secs) = self.conversational_split(ctx)?;
                draft.dialog = Some(
                    self.write(&prompts::dialog(ctx, topic, dialog_secs, target_words(dialog_secs, wps)))
                        .await?,
                );
                draft.script = Some(
                    self.write(&prompts::narration(ctx, topic, broll_secs, target_words(broll_secs, wps)))
                        .await?,
                );
            }
            RecipeKind::Interactive | RecipeKind::Autonomous => {}
        }

        debug!(
            caption_len = draft.caption.len(),
            has_script = draft.script.is_some(),
            beats = draft.beats.len(),
            "Content drafted"
        );
        Ok(StageOutput::Content(draft))
    }

    async fn image_visual(&self, ctx: &RunContext) -> Result<StageOutput, PostflowError> {
        let topic = ctx.topic.as_deref().ok_or_else(|| missing("topic"))?;
        let caption = ctx.caption().ok_or_else(|| missing("caption"))?;
        let spec = GenerationSpec::new(prompts::image(ctx, topic, caption)).with_aspect(ctx.aspect);

        let job = self
            .router
            .route(self.ports.media.as_ref(), Capability::Image, &spec, &ctx.route)
            .await?;
        info!(provider = %job.provider_used, fallback = job.used_fallback(), "Image generated");
        Ok(StageOutput::Visual(VisualOutput::single(
            job.artifact,
            job.provider_used,
            job.fallback_from,
        )))
    }

    async fn long_form_visual(&self, ctx: &RunContext) -> Result<StageOutput, PostflowError> {
        let script = ctx.script().ok_or_else(|| missing("narration script"))?;
        let beats = ctx.content.as_ref().map(|c| c.beats.clone()).unwrap_or_default();
        let max_clip = self
            .router
            .max_clip_duration(Capability::Video, &ctx.route)
            .ok_or_else(|| RouterError::NoCandidates {
                capability: Capability::Video.to_string(),
            })?;

        let plan = {
            let mut rng = rand::thread_rng();
            SegmentPlan::build(ctx.target_duration, max_clip, &beats, &mut rng)?
        };
        info!(
            segments = plan.len(),
            total = plan.total_duration,
            max_clip,
            "Segment plan ready"
        );

        let video = self.assembler.assemble(&plan, ctx.aspect, &ctx.route).await?;
        let narration = self.narrate(script).await?;
        let reconciled = self
            .reconciler
            .reconcile(&narration.artifact, narration.duration, video.duration, Some(script))
            .await?;
        let muxed = self.ports.editor.mux(&video.artifact, &reconciled.audio).await?;

        Ok(StageOutput::Visual(VisualOutput {
            artifact: muxed.with_duration(video.duration),
            duration: Some(video.duration),
            providers: video.providers.clone(),
            fallback_from: video.fallback_from.clone(),
            sync: vec![reconciled.decision],
            assembly: Some(video),
        }))
    }

    async fn conversational_visual(&self, ctx: &RunContext) -> Result<StageOutput, PostflowError> {
        let topic = ctx.topic.as_deref().ok_or_else(|| missing("topic"))?;
        let content = ctx.content.as_ref().ok_or_else(|| missing("content"))?;
        let line = content.dialog.as_deref().ok_or_else(|| missing("dialog line"))?;
        let script = content.script.as_deref().ok_or_else(|| missing("narration script"))?;
        let (dialog_secs, broll_secs) = self.conversational_split(ctx)?;

        let dialog_spec = GenerationSpec::new(prompts::dialog_clip(topic, line))
            .with_duration(dialog_secs)
            .with_aspect(ctx.aspect);
        let broll_spec = GenerationSpec::new(prompts::b_roll(topic))
            .with_duration(broll_secs)
            .with_aspect(ctx.aspect);
        let dialog_route = ctx.route.clone().with_native_audio();

        let (dialog, broll) = tokio::join!(
            self.narrated_clip(&dialog_spec, &dialog_route, line),
            self.narrated_clip(&broll_spec, &ctx.route, script),
        );
        let (dialog, broll) = (dialog?, broll?);

        let joined = self
            .ports
            .editor
            .concat(&[dialog.artifact.clone(), broll.artifact.clone()])
            .await?;
        let duration = dialog.duration + broll.duration;
        info!(
            dialog = dialog.duration,
            b_roll = broll.duration,
            duration,
            "Conversational video joined"
        );

        let mut fallback_from = dialog.fallback_from;
        fallback_from.extend(broll.fallback_from);
        Ok(StageOutput::Visual(VisualOutput {
            artifact: joined.with_duration(duration),
            duration: Some(duration),
            providers: vec![dialog.provider, broll.provider],
            fallback_from,
            sync: vec![dialog.sync, broll.sync],
            assembly: None,
        }))
    }

    /// Generates one clip and lays reconciled narration of `text` over it.
    async fn narrated_clip(
        &self,
        spec: &GenerationSpec,
        options: &RouteOptions,
        text: &str,
    ) -> Result<PhaseClip, PostflowError> {
        let job = self
            .router
            .route(self.ports.media.as_ref(), Capability::Video, spec, options)
            .await?;
        let planned = job.spec.duration.or(spec.duration).unwrap_or(0.0);
        let duration = self.measure(&job.artifact, planned).await;

        let narration = self.narrate(text).await?;
        let reconciled = self
            .reconciler
            .reconcile(&narration.artifact, narration.duration, duration, Some(text))
            .await?;
        let artifact = self.ports.editor.mux(&job.artifact, &reconciled.audio).await?;

        Ok(PhaseClip {
            artifact: artifact.with_duration(duration),
            duration,
            provider: job.provider_used,
            fallback_from: job.fallback_from,
            sync: reconciled.decision,
        })
    }

    async fn narrate(&self, text: &str) -> Result<SynthesizedAudio, PostflowError> {
        let speech = self.ports.speech.as_ref().ok_or_else(|| {
            PostflowError::Config(ConfigError::new(
                "speech",
                "narrated video needs a speech synthesizer",
            ))
        })?;
        Ok(speech.synthesize(text).await?)
    }

    async fn measure(&self, artifact: &ArtifactRef, planned: f64) -> f64 {
        match self.ports.editor.probe_duration(artifact).await {
            Ok(seconds) => seconds,
            Err(e) => {
                let fallback = artifact.duration.unwrap_or(planned);
                warn!(artifact = %artifact, error = %e, fallback, "Probe failed, using reported duration");
                fallback
            }
        }
    }

    /// Dialog and B-roll lengths for a conversational video.
    ///
    /// The dialog takes its share of the target, capped by the longest
    /// native-audio clip; the B-roll takes the rest, capped by the longest
    /// clip any candidate makes.
    fn conversational_split(&self, ctx: &RunContext) -> Result<(f64, f64), PostflowError> {
        let no_candidates = || RouterError::NoCandidates {
            capability: Capability::Video.to_string(),
        };
        let native_max = self
            .router
            .max_clip_duration(Capability::Video, &ctx.route.clone().with_native_audio())
            .ok_or_else(no_candidates)?;
        let any_max = self
            .router
            .max_clip_duration(Capability::Video, &ctx.route)
            .ok_or_else(no_candidates)?;

        let dialog = (ctx.target_duration * DIALOG_SHARE).min(native_max);
        let broll = (ctx.target_duration - dialog).min(any_max);
        Ok((dialog, broll))
    }

    async fn review(&self, ctx: &RunContext) -> Result<StageOutput, PostflowError> {
        let caption = ctx.caption().ok_or_else(|| missing("caption"))?;

        if ctx.recipe.has_gates() {
            let text = match ctx.script() {
                Some(script) => format!("{caption}\n\n{script}"),
                None => caption.to_string(),
            };
            let score = self.quality.assess(&text).await?;
            let passed = self.quality.passes(&score);
            info!(aggregate = score.aggregate, passed, "Quality scored for reviewer");
            return Ok(StageOutput::Review(ReviewOutput {
                score,
                passed,
                revised_caption: None,
                revisions: 0,
            }));
        }

        let outcome = self
            .quality
            .evaluate_with_revisions(caption, self.ports.text.as_ref(), self.text_timeout())
            .await?;
        info!(
            aggregate = outcome.score.aggregate,
            revisions = outcome.revisions,
            "Quality accepted"
        );
        Ok(StageOutput::Review(ReviewOutput {
            passed: true,
            revised_caption: (outcome.revisions > 0).then_some(outcome.text),
            revisions: outcome.revisions,
            score: outcome.score,
        }))
    }

    async fn publish(&self, ctx: &RunContext, ledger: &PublishLedger) -> Result<StageOutput, PostflowError> {
        let artifact = ctx.visual.as_ref().ok_or_else(|| missing("visual"))?;
        let caption = ctx.caption().ok_or_else(|| missing("caption"))?;
        let mut posts = Vec::with_capacity(ctx.platforms.len());

        for platform in &ctx.platforms {
            let key = PublishLedger::key(ctx.run_id, platform, &artifact.uri);
            if let Some(entry) = ledger.get(&key) {
                info!(platform = %platform, remote_id = %entry.remote_id, "Already published, skipping");
                posts.push(PublishedPost {
                    platform: platform.clone(),
                    remote_id: entry.remote_id,
                    reused: true,
                });
                continue;
            }

            let remote_id = self.ports.publisher.publish(artifact, caption, platform).await?;
            ledger.record(key, platform, &remote_id);
            info!(platform = %platform, remote_id = %remote_id, "Published");
            posts.push(PublishedPost {
                platform: platform.clone(),
                remote_id,
                reused: false,
            });
        }

        Ok(StageOutput::Published(posts))
    }
}
