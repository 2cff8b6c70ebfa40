//! Scripted collaborators.
//!
//! Every port has a double here that answers from a script and records
//! what it was asked, so tests can drive a run without real backends.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::approval::ActionTag;
use crate::core::{ArtifactKind, ArtifactRef};
use crate::errors::ProviderError;
use crate::providers::{Capability, GenerationSpec, ProviderCandidate};
use crate::quality::QualityScore;
use crate::reconcile::word_count;
use crate::stages::ports::{
    MediaEditor, MediaGenerator, Notifier, Publisher, QualityScorer, SpeechSynthesizer,
    SynthesizedAudio, TextGenerator,
};

/// Text returned by [`ScriptedTextGenerator`] once its queue is empty.
pub const DEFAULT_SCRIPT: &str = "Stop scrolling for this. The harbor wakes up before sunrise. \
    Fishing boats slip out one by one while the gulls circle overhead. \
    The light turns gold over the water. Follow for the full story!";

/// Narration pace used by [`ScriptedSpeech`] when no duration is queued.
const SCRIPTED_WORDS_PER_SECOND: f64 = 2.5;

/// Text generator answering from a queue, then with a default text.
#[derive(Debug)]
pub struct ScriptedTextGenerator {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_text: String,
    failing: bool,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedTextGenerator {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_text: DEFAULT_SCRIPT.to_string(),
            failing: false,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedTextGenerator {
    /// Creates a generator that always answers [`DEFAULT_SCRIPT`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues responses returned in order before the default.
    #[must_use]
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses
            .lock()
            .extend(responses.into_iter().map(|r| Ok(r.into())));
        self
    }

    /// Queues one failure.
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.responses
            .lock()
            .push_back(Err(ProviderError::failed("scripted-text", message)));
        self
    }

    /// Replaces the default text.
    #[must_use]
    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    /// Fails every call once the queue is empty.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Prompts received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
        self.prompts.lock().push(prompt.to_string());
        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        if self.failing {
            return Err(ProviderError::failed("scripted-text", "text backend unavailable"));
        }
        Ok(self.default_text.clone())
    }
}

/// Media generator with per-candidate, per-call and per-prompt failures.
#[derive(Debug, Default)]
pub struct ScriptedMediaGenerator {
    failing_candidates: HashSet<String>,
    stalled_candidates: HashSet<String>,
    fail_first: usize,
    failing_prompts: Vec<String>,
    latency: Option<Duration>,
    calls: Mutex<Vec<String>>,
    specs: Mutex<Vec<GenerationSpec>>,
    counter: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedMediaGenerator {
    /// Creates a generator where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to candidate `id` fail.
    #[must_use]
    pub fn fail_candidate(mut self, id: impl Into<String>) -> Self {
        self.failing_candidates.insert(id.into());
        self
    }

    /// Makes every call to candidate `id` hang until the router's timeout.
    #[must_use]
    pub fn stall_candidate(mut self, id: impl Into<String>) -> Self {
        self.stalled_candidates.insert(id.into());
        self
    }

    /// Fails the first `count` calls, whatever the candidate.
    #[must_use]
    pub fn fail_first(mut self, count: usize) -> Self {
        self.fail_first = count;
        self
    }

    /// Fails every call whose prompt contains `needle`.
    #[must_use]
    pub fn fail_prompts_containing(mut self, needle: impl Into<String>) -> Self {
        self.failing_prompts.push(needle.into());
        self
    }

    /// Sleeps this long inside every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Candidate ids invoked, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Specs received, in call order.
    #[must_use]
    pub fn specs(&self) -> Vec<GenerationSpec> {
        self.specs.lock().clone()
    }

    /// Highest number of calls that were running at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, call: usize, spec: &GenerationSpec, candidate: &ProviderCandidate) -> Option<ProviderError> {
        if call < self.fail_first {
            return Some(ProviderError::failed(&candidate.id, format!("scripted failure on call {call}")));
        }
        if self.failing_candidates.contains(&candidate.id) {
            return Some(ProviderError::failed(&candidate.id, "candidate unavailable"));
        }
        self.failing_prompts
            .iter()
            .find(|needle| spec.prompt.contains(needle.as_str()))
            .map(|needle| ProviderError::failed(&candidate.id, format!("prompt rejected: {needle}")))
    }
}

#[async_trait]
impl MediaGenerator for ScriptedMediaGenerator {
    async fn generate(
        &self,
        capability: Capability,
        spec: &GenerationSpec,
        candidate: &ProviderCandidate,
    ) -> Result<ArtifactRef, ProviderError> {
        let call = self.counter.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(candidate.id.clone());
        self.specs.lock().push(spec.clone());

        if self.stalled_candidates.contains(&candidate.id) {
            std::future::pending::<()>().await;
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.scripted_failure(call, spec, candidate) {
            return Err(err);
        }

        let artifact = match capability {
            Capability::Image => ArtifactRef::new(format!("{}/image-{call}.png", candidate.id), ArtifactKind::Image),
            Capability::Video => ArtifactRef::new(format!("{}/clip-{call}.mp4", candidate.id), ArtifactKind::Video),
        };
        Ok(match spec.duration {
            Some(seconds) => artifact.with_duration(seconds),
            None => artifact,
        })
    }
}

/// Speech synthesizer answering with queued durations.
///
/// Without a queued duration the length is estimated from the word count.
#[derive(Debug, Default)]
pub struct ScriptedSpeech {
    durations: Mutex<VecDeque<f64>>,
    failing: bool,
    texts: Mutex<Vec<String>>,
}

impl ScriptedSpeech {
    /// Creates a synthesizer pacing narration at 2.5 words per second.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues durations returned in order.
    #[must_use]
    pub fn with_durations(self, durations: impl IntoIterator<Item = f64>) -> Self {
        self.durations.lock().extend(durations);
        self
    }

    /// Fails every call.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Texts received, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSpeech {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, ProviderError> {
        let call = {
            let mut texts = self.texts.lock();
            texts.push(text.to_string());
            texts.len()
        };
        if self.failing {
            return Err(ProviderError::failed("scripted-tts", "voice unavailable"));
        }
        let duration = self
            .durations
            .lock()
            .pop_front()
            .unwrap_or_else(|| word_count(text) as f64 / SCRIPTED_WORDS_PER_SECOND);
        Ok(SynthesizedAudio {
            artifact: ArtifactRef::audio(format!("tts/narration-{call}.wav")).with_duration(duration),
            duration,
        })
    }
}

/// Media editor that records every operation.
#[derive(Debug, Default)]
pub struct ScriptedEditor {
    probe_durations: Mutex<VecDeque<f64>>,
    fail_crossfade: bool,
    failing_trims: AtomicUsize,
    trims: Mutex<Vec<(f64, f64)>>,
    crossfades: Mutex<Vec<(f64, f64)>>,
    concats: AtomicUsize,
    muxes: Mutex<Vec<(String, String)>>,
}

impl ScriptedEditor {
    /// Creates an editor where every operation succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues measured durations returned by `probe_duration` in order.
    ///
    /// Once empty, probes report the artifact's own duration.
    #[must_use]
    pub fn with_probe_durations(self, durations: impl IntoIterator<Item = f64>) -> Self {
        self.probe_durations.lock().extend(durations);
        self
    }

    /// Makes every crossfade fail.
    #[must_use]
    pub fn failing_crossfade(mut self) -> Self {
        self.fail_crossfade = true;
        self
    }

    /// Fails the first `count` audio trims.
    #[must_use]
    pub fn fail_first_trims(self, count: usize) -> Self {
        self.failing_trims.store(count, Ordering::SeqCst);
        self
    }

    /// `(duration, fade_out)` of every trim attempted.
    #[must_use]
    pub fn trims(&self) -> Vec<(f64, f64)> {
        self.trims.lock().clone()
    }

    /// `(offset, fade)` of every crossfade attempted.
    #[must_use]
    pub fn crossfades(&self) -> Vec<(f64, f64)> {
        self.crossfades.lock().clone()
    }

    /// Number of hard-cut concatenations.
    #[must_use]
    pub fn concats(&self) -> usize {
        self.concats.load(Ordering::SeqCst)
    }

    /// `(video uri, audio uri)` of every mux.
    #[must_use]
    pub fn muxes(&self) -> Vec<(String, String)> {
        self.muxes.lock().clone()
    }
}

#[async_trait]
impl MediaEditor for ScriptedEditor {
    async fn probe_duration(&self, artifact: &ArtifactRef) -> Result<f64, ProviderError> {
        if let Some(measured) = self.probe_durations.lock().pop_front() {
            return Ok(measured);
        }
        artifact
            .duration
            .ok_or_else(|| ProviderError::failed("scripted-editor", format!("cannot probe {artifact}")))
    }

    async fn trim_audio(
        &self,
        audio: &ArtifactRef,
        duration: f64,
        fade_out: f64,
    ) -> Result<ArtifactRef, ProviderError> {
        self.trims.lock().push((duration, fade_out));
        let remaining = self.failing_trims.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_trims.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::failed("scripted-editor", "ffmpeg busy"));
        }
        Ok(ArtifactRef::audio(format!("{}#trim={duration:.2}", audio.uri)).with_duration(duration))
    }

    async fn crossfade(
        &self,
        first: &ArtifactRef,
        second: &ArtifactRef,
        offset: f64,
        fade: f64,
    ) -> Result<ArtifactRef, ProviderError> {
        self.crossfades.lock().push((offset, fade));
        if self.fail_crossfade {
            return Err(ProviderError::failed("scripted-editor", "xfade filter failed"));
        }
        Ok(ArtifactRef::video(format!("xfade({},{})", first.uri, second.uri)))
    }

    async fn concat(&self, clips: &[ArtifactRef]) -> Result<ArtifactRef, ProviderError> {
        self.concats.fetch_add(1, Ordering::SeqCst);
        let uris: Vec<&str> = clips.iter().map(|c| c.uri.as_str()).collect();
        let total: f64 = clips.iter().filter_map(|c| c.duration).sum();
        Ok(ArtifactRef::video(format!("concat({})", uris.join(","))).with_duration(total))
    }

    async fn mux(&self, video: &ArtifactRef, audio: &ArtifactRef) -> Result<ArtifactRef, ProviderError> {
        self.muxes.lock().push((video.uri.clone(), audio.uri.clone()));
        let muxed = ArtifactRef::video(format!("{}+{}", video.uri, audio.uri));
        Ok(match video.duration {
            Some(seconds) => muxed.with_duration(seconds),
            None => muxed,
        })
    }
}

/// One recorded publish call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishCall {
    /// Target platform.
    pub platform: String,
    /// Caption sent.
    pub caption: String,
    /// Artifact uri sent.
    pub uri: String,
}

/// Publisher that records posts and can reject platforms.
#[derive(Debug, Default)]
pub struct ScriptedPublisher {
    failing_platforms: HashSet<String>,
    fail_all: bool,
    calls: Mutex<Vec<PublishCall>>,
}

impl ScriptedPublisher {
    /// Creates a publisher accepting every post.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every post.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Rejects posts to `platform`.
    #[must_use]
    pub fn failing_platform(mut self, platform: impl Into<String>) -> Self {
        self.failing_platforms.insert(platform.into());
        self
    }

    /// Every publish call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(
        &self,
        artifact: &ArtifactRef,
        caption: &str,
        platform: &str,
    ) -> Result<String, ProviderError> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(PublishCall {
                platform: platform.to_string(),
                caption: caption.to_string(),
                uri: artifact.uri.clone(),
            });
            calls.len()
        };
        if self.fail_all || self.failing_platforms.contains(platform) {
            return Err(ProviderError::failed(platform, "post rejected"));
        }
        Ok(format!("{platform}-post-{call}"))
    }
}

/// Scorer answering with queued aggregates, then a passing 8.0.
#[derive(Debug, Default)]
pub struct ScriptedScorer {
    aggregates: Mutex<VecDeque<f64>>,
    texts: Mutex<Vec<String>>,
}

impl ScriptedScorer {
    /// Creates a scorer that passes everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues aggregates; each becomes a uniform score across the rubric.
    #[must_use]
    pub fn with_aggregates(self, aggregates: impl IntoIterator<Item = f64>) -> Self {
        self.aggregates.lock().extend(aggregates);
        self
    }

    /// Texts scored, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl QualityScorer for ScriptedScorer {
    async fn score(&self, text: &str) -> Result<QualityScore, ProviderError> {
        self.texts.lock().push(text.to_string());
        let aggregate = self.aggregates.lock().pop_front().unwrap_or(8.0);
        Ok(QualityScore::uniform(aggregate))
    }
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Message text.
    pub message: String,
    /// Attached preview.
    pub artifact: Option<ArtifactRef>,
    /// Actions offered.
    pub options: Vec<ActionTag>,
}

/// Notifier that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    failing: bool,
    messages: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records messages but reports delivery failure.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Every notification, in order.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.messages.lock().clone()
    }

    /// Message texts, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().iter().map(|n| n.message.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        message: &str,
        artifact: Option<&ArtifactRef>,
        options: &[ActionTag],
    ) -> Result<(), ProviderError> {
        self.messages.lock().push(Notification {
            message: message.to_string(),
            artifact: artifact.cloned(),
            options: options.to_vec(),
        });
        if self.failing {
            return Err(ProviderError::failed("notifier", "chat surface offline"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CapabilityTable;

    #[tokio::test]
    async fn test_text_generator_queue_then_default() {
        let text = ScriptedTextGenerator::new()
            .with_responses(["first"])
            .with_failure("quota");

        assert_eq!(text.generate("a", Duration::from_secs(1)).await.unwrap(), "first");
        assert!(text.generate("b", Duration::from_secs(1)).await.is_err());
        assert_eq!(text.generate("c", Duration::from_secs(1)).await.unwrap(), DEFAULT_SCRIPT);
        assert_eq!(text.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_media_generator_reports_snapped_duration() {
        let media = ScriptedMediaGenerator::new();
        let candidate = ProviderCandidate::video("clip-a", 0, CapabilityTable::new(10.0));
        let artifact = media
            .generate(Capability::Video, &GenerationSpec::new("x").with_duration(8.0), &candidate)
            .await
            .unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Video);
        assert_eq!(artifact.duration, Some(8.0));
        assert_eq!(media.calls(), vec!["clip-a"]);
    }

    #[tokio::test]
    async fn test_speech_estimates_from_word_count() {
        let speech = ScriptedSpeech::new().with_durations([3.0]);
        assert_eq!(speech.synthesize("one two").await.unwrap().duration, 3.0);
        let estimated = speech.synthesize("one two three four five").await.unwrap();
        assert!((estimated.duration - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_editor_probe_falls_back_to_artifact() {
        let editor = ScriptedEditor::new().with_probe_durations([9.5]);
        let clip = ArtifactRef::video("a.mp4").with_duration(10.0);
        assert_eq!(editor.probe_duration(&clip).await.unwrap(), 9.5);
        assert_eq!(editor.probe_duration(&clip).await.unwrap(), 10.0);
        assert!(editor.probe_duration(&ArtifactRef::video("b.mp4")).await.is_err());
    }

    #[tokio::test]
    async fn test_publisher_and_notifier_record_calls() {
        let publisher = ScriptedPublisher::new().failing_platform("tiktok");
        let clip = ArtifactRef::video("final.mp4");
        assert_eq!(publisher.publish(&clip, "hi", "instagram").await.unwrap(), "instagram-post-1");
        assert!(publisher.publish(&clip, "hi", "tiktok").await.is_err());
        assert_eq!(publisher.calls().len(), 2);

        let notifier = RecordingNotifier::new().failing();
        assert!(notifier.notify("review", None, &ActionTag::FAILURE).await.is_err());
        assert_eq!(notifier.messages(), vec!["review"]);
    }
}
