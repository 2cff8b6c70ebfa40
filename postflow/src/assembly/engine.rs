//! Parallel segment generation and crossfade concatenation.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{crossfaded_duration, AssemblyConfig, SegmentPlan};
use crate::core::ArtifactRef;
use crate::errors::{AssemblyError, ProviderError};
use crate::providers::{AspectRatio, Capability, FallbackRouter, GenerationJob, GenerationSpec, RouteOptions};
use crate::stages::ports::{MediaEditor, MediaGenerator};

/// The concatenated video and how it was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledVideo {
    /// Final video.
    pub artifact: ArtifactRef,
    /// Length of the final video in seconds.
    pub duration: f64,
    /// Plan indices that made it into the video, in order.
    pub used_segments: Vec<usize>,
    /// Plan indices that failed every round.
    pub dropped_segments: Vec<usize>,
    /// Measured duration of each used segment.
    pub segment_durations: Vec<f64>,
    /// Provider that generated each used segment.
    pub providers: Vec<String>,
    /// Candidates that failed before a segment's provider succeeded, first
    /// occurrence order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_from: Vec<String>,
    /// Whether the crossfade chain failed and clips were hard-cut instead.
    pub hard_cut: bool,
    /// Retry rounds run after the first pass.
    pub retry_rounds: u32,
}

impl AssembledVideo {
    /// Serializes to JSON for stage payloads.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Generates planned segments in parallel and joins them.
#[derive(Clone)]
pub struct SegmentAssembler {
    router: FallbackRouter,
    media: Arc<dyn MediaGenerator>,
    editor: Arc<dyn MediaEditor>,
    config: AssemblyConfig,
}

impl std::fmt::Debug for SegmentAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentAssembler")
            .field("router", &self.router)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SegmentAssembler {
    /// Creates an assembler with default settings.
    #[must_use]
    pub fn new(
        router: FallbackRouter,
        media: Arc<dyn MediaGenerator>,
        editor: Arc<dyn MediaEditor>,
    ) -> Self {
        Self {
            router,
            media,
            editor,
            config: AssemblyConfig::default(),
        }
    }

    /// Overrides the settings.
    #[must_use]
    pub fn with_config(mut self, config: AssemblyConfig) -> Self {
        self.config = config;
        self
    }

    /// Active settings.
    #[must_use]
    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Generates every segment in `plan` and concatenates the survivors.
    pub async fn assemble(
        &self,
        plan: &SegmentPlan,
        aspect: AspectRatio,
        options: &RouteOptions,
    ) -> Result<AssembledVideo, AssemblyError> {
        let required = self.config.min_segments.max(2);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut generated: BTreeMap<usize, GenerationJob> = BTreeMap::new();
        let mut pending: Vec<usize> = (0..plan.len()).collect();
        let mut rounds_run = 0;

        info!(
            segments = plan.len(),
            concurrency = self.config.concurrency,
            "Assembling segments"
        );

        for round in 0..=self.config.retry_rounds {
            if pending.is_empty() {
                break;
            }
            if round > 0 {
                let delay = self.config.retry.delay_for(round - 1);
                debug!(
                    round,
                    failed = pending.len(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retrying segments"
                );
                tokio::time::sleep(delay).await;
                rounds_run = round;
            }

            let mut in_flight = FuturesUnordered::new();
            for &index in &pending {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| AssemblyError::Plan(format!("semaphore closed: {e}")))?;

                let segment = &plan.segments[index];
                let spec = GenerationSpec::new(segment.prompt())
                    .with_duration(segment.duration)
                    .with_aspect(aspect);
                let router = self.router.clone();
                let media = self.media.clone();
                let options = options.clone();

                let handle = tokio::spawn(async move {
                    let result = router
                        .route(media.as_ref(), Capability::Video, &spec, &options)
                        .await;
                    drop(permit);
                    result
                });
                in_flight.push(async move { (index, handle.await) });
            }

            let mut failed = Vec::new();
            while let Some((index, joined)) = in_flight.next().await {
                match joined {
                    Ok(Ok(job)) => {
                        generated.insert(index, job);
                    }
                    Ok(Err(e)) => {
                        warn!(segment = index, round, error = %e, "Segment failed");
                        failed.push(index);
                    }
                    Err(e) => {
                        warn!(segment = index, round, error = %e, "Segment task aborted");
                        failed.push(index);
                    }
                }
            }
            failed.sort_unstable();
            pending = failed;
        }

        if generated.len() < required {
            return Err(AssemblyError::InsufficientSegments {
                succeeded: generated.len(),
                required,
                planned: plan.len(),
            });
        }
        if !pending.is_empty() {
            warn!(dropped = ?pending, "Continuing without failed segments");
        }

        let mut clips = Vec::with_capacity(generated.len());
        let mut durations = Vec::with_capacity(generated.len());
        let mut providers = Vec::with_capacity(generated.len());
        let mut fallback_from: Vec<String> = Vec::new();
        for (index, job) in &generated {
            let measured = match self.editor.probe_duration(&job.artifact).await {
                Ok(d) => d,
                Err(e) => {
                    let fallback = job
                        .artifact
                        .duration
                        .unwrap_or(plan.segments[*index].duration);
                    warn!(segment = index, error = %e, fallback, "Probe failed, using reported duration");
                    fallback
                }
            };
            clips.push(job.artifact.clone());
            durations.push(measured);
            providers.push(job.provider_used.clone());
            for failed in &job.fallback_from {
                if !fallback_from.contains(failed) {
                    fallback_from.push(failed.clone());
                }
            }
        }

        let (artifact, duration, hard_cut) = self.join(&clips, &durations).await?;
        info!(
            used = clips.len(),
            dropped = pending.len(),
            duration,
            hard_cut,
            "Segments assembled"
        );

        Ok(AssembledVideo {
            artifact: artifact.with_duration(duration),
            duration,
            used_segments: generated.keys().copied().collect(),
            dropped_segments: pending,
            segment_durations: durations,
            providers,
            fallback_from,
            hard_cut,
            retry_rounds: rounds_run,
        })
    }

    /// Chains crossfades over measured durations, falling back to hard cuts.
    async fn join(
        &self,
        clips: &[ArtifactRef],
        durations: &[f64],
    ) -> Result<(ArtifactRef, f64, bool), AssemblyError> {
        let fade = self.config.crossfade_secs;
        if fade > 0.0 {
            match self.crossfade_chain(clips, durations, fade).await {
                Ok(artifact) => return Ok((artifact, crossfaded_duration(durations, fade), false)),
                Err(e) => warn!(error = %e, "Crossfade failed, falling back to hard cuts"),
            }
        }

        let artifact = self
            .editor
            .concat(clips)
            .await
            .map_err(AssemblyError::Editor)?;
        Ok((artifact, durations.iter().sum(), fade > 0.0))
    }

    async fn crossfade_chain(
        &self,
        clips: &[ArtifactRef],
        durations: &[f64],
        fade: f64,
    ) -> Result<ArtifactRef, ProviderError> {
        let mut merged = clips[0].clone();
        let mut accumulated = durations[0];
        for (clip, duration) in clips.iter().zip(durations).skip(1) {
            let offset = accumulated - fade;
            merged = self.editor.crossfade(&merged, clip, offset, fade).await?;
            accumulated += duration - fade;
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CapabilityTable, ProviderCandidate};
    use crate::retry::JitterStrategy;
    use crate::testing::{ScriptedEditor, ScriptedMediaGenerator};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn router() -> FallbackRouter {
        FallbackRouter::new(vec![ProviderCandidate::video(
            "clip-a",
            0,
            CapabilityTable::new(10.0),
        )])
    }

    #[tokio::test]
    async fn test_segment_fallbacks_are_reported() {
        let router = FallbackRouter::new(vec![
            ProviderCandidate::video("clip-a", 0, CapabilityTable::new(10.0)),
            ProviderCandidate::video("clip-b", 1, CapabilityTable::new(10.0)),
        ]);
        let media = Arc::new(ScriptedMediaGenerator::new().fail_candidate("clip-a"));
        let assembler = SegmentAssembler::new(router, media, Arc::new(ScriptedEditor::new()))
            .with_config(fast_config());

        let video = assembler
            .assemble(&plan(20.0), AspectRatio::Portrait, &RouteOptions::new())
            .await
            .unwrap();

        assert_eq!(video.providers, vec!["clip-b", "clip-b"]);
        assert_eq!(video.fallback_from, vec!["clip-a"]);
        assert_eq!(video.to_value()["fallback_from"], serde_json::json!(["clip-a"]));
    }

    fn fast_config() -> AssemblyConfig {
        AssemblyConfig {
            retry: crate::retry::RetryConfig::new()
                .with_base_delay_ms(10)
                .with_jitter(JitterStrategy::None),
            ..AssemblyConfig::default()
        }
    }

    fn plan(total: f64) -> SegmentPlan {
        let mut rng = StdRng::seed_from_u64(3);
        SegmentPlan::build(total, 10.0, &[], &mut rng).unwrap()
    }

    #[tokio::test]
    async fn test_crossfades_use_measured_durations() {
        let media = Arc::new(ScriptedMediaGenerator::new());
        let editor = Arc::new(
            ScriptedEditor::new().with_probe_durations([9.8, 10.1, 9.9]),
        );
        let assembler = SegmentAssembler::new(router(), media, editor.clone()).with_config(fast_config());

        let video = assembler
            .assemble(&plan(30.0), AspectRatio::Portrait, &RouteOptions::new())
            .await
            .unwrap();

        assert!((video.duration - 28.8).abs() < 1e-9);
        assert!(!video.hard_cut);
        assert_eq!(video.used_segments, vec![0, 1, 2]);
        let offsets: Vec<f64> = editor.crossfades().iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets.len(), 2);
        assert!((offsets[0] - 9.3).abs() < 1e-9);
        assert!((offsets[1] - 18.9).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_segments_are_retried_in_order() {
        let media = Arc::new(ScriptedMediaGenerator::new().fail_first(2));
        let editor = Arc::new(ScriptedEditor::new());
        let assembler = SegmentAssembler::new(router(), media.clone(), editor).with_config(fast_config());

        let video = assembler
            .assemble(&plan(30.0), AspectRatio::Portrait, &RouteOptions::new())
            .await
            .unwrap();

        assert_eq!(video.used_segments, vec![0, 1, 2]);
        assert_eq!(video.retry_rounds, 1);
        assert_eq!(media.calls().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_few_segments_fails() {
        let media = Arc::new(ScriptedMediaGenerator::new().fail_candidate("clip-a"));
        let editor = Arc::new(ScriptedEditor::new());
        let assembler = SegmentAssembler::new(router(), media.clone(), editor).with_config(fast_config());

        let err = assembler
            .assemble(&plan(30.0), AspectRatio::Portrait, &RouteOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AssemblyError::InsufficientSegments {
                succeeded: 0,
                required: 2,
                planned: 3
            }
        ));
        // first pass plus three retry rounds
        assert_eq!(media.calls().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proceeds_with_two_of_three() {
        let media = Arc::new(ScriptedMediaGenerator::new().fail_prompts_containing("closing"));
        let editor = Arc::new(ScriptedEditor::new());
        let assembler = SegmentAssembler::new(router(), media, editor).with_config(fast_config());

        let video = assembler
            .assemble(&plan(30.0), AspectRatio::Portrait, &RouteOptions::new())
            .await
            .unwrap();

        assert_eq!(video.used_segments, vec![0, 1]);
        assert_eq!(video.dropped_segments, vec![2]);
    }

    #[tokio::test]
    async fn test_crossfade_failure_falls_back_to_hard_cut() {
        let media = Arc::new(ScriptedMediaGenerator::new());
        let editor = Arc::new(
            ScriptedEditor::new()
                .with_probe_durations([10.0, 10.0, 10.0])
                .failing_crossfade(),
        );
        let assembler = SegmentAssembler::new(router(), media, editor.clone()).with_config(fast_config());

        let video = assembler
            .assemble(&plan(30.0), AspectRatio::Portrait, &RouteOptions::new())
            .await
            .unwrap();

        assert!(video.hard_cut);
        assert!((video.duration - 30.0).abs() < 1e-9);
        assert_eq!(editor.concats(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let media = Arc::new(ScriptedMediaGenerator::new().with_latency(std::time::Duration::from_millis(20)));
        let editor = Arc::new(ScriptedEditor::new());
        let config = AssemblyConfig {
            concurrency: 2,
            ..fast_config()
        };
        let assembler = SegmentAssembler::new(router(), media.clone(), editor).with_config(config);

        assembler
            .assemble(&plan(60.0), AspectRatio::Portrait, &RouteOptions::new())
            .await
            .unwrap();

        assert!(media.max_in_flight() <= 2);
        assert_eq!(media.calls().len(), 6);
    }
}
