//! Applies reconciliation decisions through the media editor and synthesizer.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{classify, shorten_script, target_words, trim_warning, SyncAction, SyncDecision, Thresholds};
use crate::config::DEFAULT_WORDS_PER_SECOND;
use crate::core::ArtifactRef;
use crate::errors::ReconcileError;
use crate::stages::ports::{MediaEditor, SpeechSynthesizer};

/// Reconciled narration and the decision that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Audio to lay over the video.
    pub audio: ArtifactRef,
    /// What was done.
    pub decision: SyncDecision,
}

/// Fits narration to a video without looping or padding.
#[derive(Clone)]
pub struct DurationReconciler {
    editor: Arc<dyn MediaEditor>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    thresholds: Thresholds,
    words_per_second: f64,
}

impl std::fmt::Debug for DurationReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationReconciler")
            .field("thresholds", &self.thresholds)
            .field("words_per_second", &self.words_per_second)
            .field("has_speech", &self.speech.is_some())
            .finish_non_exhaustive()
    }
}

impl DurationReconciler {
    /// Creates a reconciler with default thresholds.
    #[must_use]
    pub fn new(editor: Arc<dyn MediaEditor>) -> Self {
        Self {
            editor,
            speech: None,
            thresholds: Thresholds::default(),
            words_per_second: DEFAULT_WORDS_PER_SECOND,
        }
    }

    /// Enables regeneration through `speech`.
    #[must_use]
    pub fn with_speech(mut self, speech: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        self.speech = speech;
        self
    }

    /// Overrides the thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Overrides the narration pace used to size shortened scripts.
    #[must_use]
    pub fn with_words_per_second(mut self, words_per_second: f64) -> Self {
        self.words_per_second = words_per_second;
        self
    }

    /// The active thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Fits `audio` (`audio_duration` seconds) to a `video_duration`-second clip.
    ///
    /// `script` is the narration text the audio was synthesized from; without
    /// it a large overrun can only be trimmed.
    pub async fn reconcile(
        &self,
        audio: &ArtifactRef,
        audio_duration: f64,
        video_duration: f64,
        script: Option<&str>,
    ) -> Result<Reconciled, ReconcileError> {
        if !audio_duration.is_finite()
            || !video_duration.is_finite()
            || audio_duration < 0.0
            || video_duration <= 0.0
        {
            return Err(ReconcileError::InvalidDurations {
                audio: audio_duration,
                video: video_duration,
            });
        }

        let action = classify(audio_duration, video_duration, &self.thresholds);
        let diff = audio_duration - video_duration;
        debug!(audio_duration, video_duration, diff, %action, "Reconciling narration");

        match action {
            SyncAction::None => Ok(Reconciled {
                audio: audio.clone().with_duration(audio_duration),
                decision: SyncDecision::new(action, audio_duration, video_duration, audio_duration),
            }),
            SyncAction::TrimSmall | SyncAction::TrimMedium | SyncAction::TrimLarge => {
                self.trim(audio, audio_duration, video_duration, action).await
            }
            SyncAction::Regenerate => {
                self.regenerate(audio, audio_duration, video_duration, script)
                    .await
            }
        }
    }

    async fn trim(
        &self,
        audio: &ArtifactRef,
        audio_duration: f64,
        video_duration: f64,
        action: SyncAction,
    ) -> Result<Reconciled, ReconcileError> {
        let trimmed = self
            .editor
            .trim_audio(audio, video_duration, self.thresholds.fade)
            .await
            .map_err(ReconcileError::Trim)?;

        let mut decision = SyncDecision::new(action, audio_duration, video_duration, video_duration);
        decision.warning = trim_warning(action, audio_duration - video_duration);
        if let Some(warning) = &decision.warning {
            warn!(%action, warning, "Narration trimmed");
        }
        Ok(Reconciled {
            audio: trimmed.with_duration(video_duration),
            decision,
        })
    }

    async fn regenerate(
        &self,
        audio: &ArtifactRef,
        audio_duration: f64,
        video_duration: f64,
        script: Option<&str>,
    ) -> Result<Reconciled, ReconcileError> {
        let target = target_words(video_duration, self.words_per_second);

        let attempt = match (script, self.speech.as_ref()) {
            (None, _) => Err("no narration script".to_string()),
            (_, None) => Err("no speech synthesizer".to_string()),
            (Some(script), Some(speech)) => match shorten_script(script, target) {
                None => Err("script has fewer than two sentences".to_string()),
                Some(shortened) => speech
                    .synthesize(&shortened)
                    .await
                    .map(|synth| (shortened, synth))
                    .map_err(|e| format!("resynthesis failed: {e}")),
            },
        };

        let (shortened, synth) = match attempt {
            Ok(pair) => pair,
            Err(reason) => {
                warn!(reason, "Cannot regenerate narration, forcing trim");
                let mut forced = self
                    .trim(audio, audio_duration, video_duration, SyncAction::TrimLarge)
                    .await?;
                if let Some(warning) = forced.decision.warning.as_mut() {
                    warning.push_str(&format!(" ({reason})"));
                }
                return Ok(forced);
            }
        };

        info!(
            original = audio_duration,
            regenerated = synth.duration,
            target_words = target,
            "Narration regenerated"
        );

        let new_diff = synth.duration - video_duration;
        if new_diff <= 0.0 {
            let mut decision = SyncDecision::new(
                SyncAction::Regenerate,
                audio_duration,
                video_duration,
                synth.duration,
            );
            decision.shortened_script = Some(shortened);
            return Ok(Reconciled {
                audio: synth.artifact.with_duration(synth.duration),
                decision,
            });
        }

        let followup = self.thresholds.trim_for(new_diff);
        let trimmed = self
            .editor
            .trim_audio(&synth.artifact, video_duration, self.thresholds.fade)
            .await
            .map_err(ReconcileError::Trim)?;

        let mut decision = SyncDecision::new(
            SyncAction::Regenerate,
            audio_duration,
            video_duration,
            video_duration,
        );
        decision.followup = Some(followup);
        decision.warning = trim_warning(followup, new_diff);
        decision.shortened_script = Some(shortened);
        Ok(Reconciled {
            audio: trimmed.with_duration(video_duration),
            decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedEditor, ScriptedSpeech};
    use pretty_assertions::assert_eq;

    const SCRIPT: &str = "Stop scrolling for this. The harbor wakes up at five. \
        Fishing boats slip out one by one while the gulls circle. \
        The light turns gold over the water. Follow for the full story!";

    fn reconciler(speech: Option<Arc<ScriptedSpeech>>) -> (DurationReconciler, Arc<ScriptedEditor>) {
        let editor = Arc::new(ScriptedEditor::new());
        let reconciler = DurationReconciler::new(editor.clone())
            .with_speech(speech.map(|s| s as Arc<dyn SpeechSynthesizer>));
        (reconciler, editor)
    }

    #[tokio::test]
    async fn test_shorter_audio_is_untouched() {
        let (reconciler, editor) = reconciler(None);
        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 7.5, 8.0, None)
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::None);
        assert_eq!(out.decision.final_duration, 7.5);
        assert_eq!(out.audio.uri, "vo.wav");
        assert!(editor.trims().is_empty());
    }

    #[tokio::test]
    async fn test_small_overrun_trims_to_video() {
        let (reconciler, editor) = reconciler(None);
        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 8.6, 8.0, None)
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::TrimSmall);
        assert_eq!(out.decision.final_duration, 8.0);
        assert!(out.decision.warning.is_none());
        assert_eq!(editor.trims(), vec![(8.0, 0.5)]);
    }

    #[tokio::test]
    async fn test_medium_overrun_warns() {
        let (reconciler, _) = reconciler(None);
        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 9.4, 8.0, None)
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::TrimMedium);
        assert_eq!(out.decision.final_duration, 8.0);
        assert!((out.decision.trimmed_seconds - 1.4).abs() < 1e-9);
        assert!(out.decision.warning.is_some());
    }

    #[tokio::test]
    async fn test_regenerate_then_secondary_trim() {
        let speech = Arc::new(ScriptedSpeech::new().with_durations([9.0]));
        let (reconciler, editor) = reconciler(Some(speech.clone()));

        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 14.0, 8.0, Some(SCRIPT))
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::Regenerate);
        assert_eq!(out.decision.followup, Some(SyncAction::TrimSmall));
        assert_eq!(out.decision.final_duration, 8.0);
        assert_eq!(editor.trims().len(), 1);

        let shortened = out.decision.shortened_script.unwrap();
        assert!(shortened.starts_with("Stop scrolling for this."));
        assert!(shortened.ends_with("Follow for the full story!"));
        assert_eq!(speech.texts(), vec![shortened]);
    }

    #[tokio::test]
    async fn test_regenerate_that_fits_needs_no_trim() {
        let speech = Arc::new(ScriptedSpeech::new().with_durations([7.8]));
        let (reconciler, editor) = reconciler(Some(speech));

        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 14.0, 8.0, Some(SCRIPT))
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::Regenerate);
        assert_eq!(out.decision.followup, None);
        assert_eq!(out.decision.final_duration, 7.8);
        assert!(editor.trims().is_empty());
    }

    #[tokio::test]
    async fn test_regenerated_audio_still_far_over_is_trimmed_large() {
        let speech = Arc::new(ScriptedSpeech::new().with_durations([12.5]));
        let (reconciler, _) = reconciler(Some(speech));

        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 14.0, 8.0, Some(SCRIPT))
            .await
            .unwrap();

        assert_eq!(out.decision.followup, Some(SyncAction::TrimLarge));
        assert_eq!(out.decision.final_duration, 8.0);
    }

    #[tokio::test]
    async fn test_no_synthesizer_forces_trim_large() {
        let (reconciler, _) = reconciler(None);
        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 14.0, 8.0, Some(SCRIPT))
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::TrimLarge);
        assert_eq!(out.decision.final_duration, 8.0);
        assert!(out.decision.warning.unwrap().contains("no speech synthesizer"));
    }

    #[tokio::test]
    async fn test_single_sentence_script_forces_trim_large() {
        let speech = Arc::new(ScriptedSpeech::new());
        let (reconciler, _) = reconciler(Some(speech.clone()));
        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 14.0, 8.0, Some("One long breath"))
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::TrimLarge);
        assert!(speech.texts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_resynthesis_forces_trim_large() {
        let speech = Arc::new(ScriptedSpeech::new().failing());
        let (reconciler, _) = reconciler(Some(speech));
        let out = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 14.0, 8.0, Some(SCRIPT))
            .await
            .unwrap();

        assert_eq!(out.decision.action, SyncAction::TrimLarge);
        assert!(out.decision.shortened_script.is_none());
    }

    #[tokio::test]
    async fn test_invalid_durations_rejected() {
        let (reconciler, _) = reconciler(None);
        let err = reconciler
            .reconcile(&ArtifactRef::audio("vo.wav"), 5.0, 0.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidDurations { .. }));
    }

    #[tokio::test]
    async fn test_final_never_exceeds_video_for_trims() {
        let (reconciler, _) = reconciler(None);
        for audio in [8.0, 8.5, 9.0, 10.0, 11.0, 15.0, 30.0] {
            let out = reconciler
                .reconcile(&ArtifactRef::audio("vo.wav"), audio, 8.0, None)
                .await
                .unwrap();
            assert!(out.decision.final_duration <= 8.0, "audio {audio}");
        }
    }
}
