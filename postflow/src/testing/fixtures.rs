//! Test harness for driving whole runs.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::mocks::{
    RecordingNotifier, ScriptedEditor, ScriptedMediaGenerator, ScriptedPublisher, ScriptedScorer,
    ScriptedSpeech, ScriptedTextGenerator,
};
use crate::approval::{ApprovalRequest, ApprovalResponse};
use crate::assembly::AssemblyConfig;
use crate::config::PipelineConfig;
use crate::events::CollectingEventSink;
use crate::pipeline::PipelineStateMachine;
use crate::providers::{CapabilityTable, ProviderCandidate};
use crate::retry::{JitterStrategy, RetryConfig};
use crate::stages::ports::StagePorts;

/// How often [`next_approval`] polls the registry.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Candidate table used by the harness.
///
/// Two image backends (`image-a` before `image-b`), a silent video backend
/// `clip-a` (clips up to 10s) and a native-audio backend `talk-a` (up to 8s).
#[must_use]
pub fn candidates() -> Vec<ProviderCandidate> {
    vec![
        ProviderCandidate::image("image-a", 1),
        ProviderCandidate::image("image-b", 2),
        ProviderCandidate::video("clip-a", 1, CapabilityTable::new(10.0)),
        ProviderCandidate::video(
            "talk-a",
            2,
            CapabilityTable::new(8.0).with_native_audio(true),
        ),
    ]
}

/// Defaults with millisecond retry delays and no jitter.
#[must_use]
pub fn fast_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_approval_timeout(Duration::from_secs(60))
        .with_assembly(AssemblyConfig {
            retry: RetryConfig::new()
                .with_base_delay_ms(1)
                .with_max_delay_ms(5)
                .with_jitter(JitterStrategy::None),
            ..AssemblyConfig::default()
        })
}

/// Scripted collaborators plus an event collector.
///
/// Every double is shared, so a test can inspect what the run asked for
/// after the machine is done with it.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// Text generation.
    pub text: Arc<ScriptedTextGenerator>,
    /// Media generation.
    pub media: Arc<ScriptedMediaGenerator>,
    /// Media editing.
    pub editor: Arc<ScriptedEditor>,
    /// Publishing.
    pub publisher: Arc<ScriptedPublisher>,
    /// Quality scoring.
    pub scorer: Arc<ScriptedScorer>,
    /// Speech synthesis, absent after [`Self::without_speech`].
    pub speech: Option<Arc<ScriptedSpeech>>,
    /// Notifications.
    pub notifier: Arc<RecordingNotifier>,
    /// Lifecycle events.
    pub events: Arc<CollectingEventSink>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self {
            text: Arc::new(ScriptedTextGenerator::new()),
            media: Arc::new(ScriptedMediaGenerator::new()),
            editor: Arc::new(ScriptedEditor::new()),
            publisher: Arc::new(ScriptedPublisher::new()),
            scorer: Arc::new(ScriptedScorer::new()),
            speech: Some(Arc::new(ScriptedSpeech::new())),
            notifier: Arc::new(RecordingNotifier::new()),
            events: Arc::new(CollectingEventSink::new()),
        }
    }
}

impl TestHarness {
    /// Creates a harness where every collaborator succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the text generator.
    #[must_use]
    pub fn with_text(mut self, text: ScriptedTextGenerator) -> Self {
        self.text = Arc::new(text);
        self
    }

    /// Replaces the media generator.
    #[must_use]
    pub fn with_media(mut self, media: ScriptedMediaGenerator) -> Self {
        self.media = Arc::new(media);
        self
    }

    /// Replaces the editor.
    #[must_use]
    pub fn with_editor(mut self, editor: ScriptedEditor) -> Self {
        self.editor = Arc::new(editor);
        self
    }

    /// Replaces the publisher.
    #[must_use]
    pub fn with_publisher(mut self, publisher: ScriptedPublisher) -> Self {
        self.publisher = Arc::new(publisher);
        self
    }

    /// Replaces the scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: ScriptedScorer) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    /// Replaces the speech synthesizer.
    #[must_use]
    pub fn with_speech(mut self, speech: ScriptedSpeech) -> Self {
        self.speech = Some(Arc::new(speech));
        self
    }

    /// Removes the speech synthesizer.
    #[must_use]
    pub fn without_speech(mut self) -> Self {
        self.speech = None;
        self
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Port bundle over the doubles.
    #[must_use]
    pub fn ports(&self) -> StagePorts {
        let ports = StagePorts::new(
            self.text.clone(),
            self.media.clone(),
            self.editor.clone(),
            self.publisher.clone(),
            self.scorer.clone(),
        )
        .with_notifier(self.notifier.clone());
        match &self.speech {
            Some(speech) => ports.with_speech(speech.clone()),
            None => ports,
        }
    }

    /// Machine over the doubles and [`candidates`], reporting to [`Self::events`].
    #[must_use]
    pub fn machine(&self, config: PipelineConfig) -> PipelineStateMachine {
        PipelineStateMachine::new(self.ports(), candidates(), config)
            .with_event_sink(self.events.clone())
    }
}

/// Waits up to `within` for a pending approval request.
pub async fn next_approval(
    machine: &PipelineStateMachine,
    within: Duration,
) -> Option<(Uuid, ApprovalRequest)> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if let Some(pending) = machine.pending_approvals().into_iter().next() {
            return Some(pending);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Waits for the next request and answers it with `response`.
///
/// Returns the request that was answered, or `None` if nothing showed up
/// in time or the answer was refused.
pub async fn answer(
    machine: &PipelineStateMachine,
    response: ApprovalResponse,
    within: Duration,
) -> Option<ApprovalRequest> {
    let (run_id, request) = next_approval(machine, within).await?;
    machine.resolve(run_id, response).then_some(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Capability;

    #[test]
    fn test_candidates_cover_both_capabilities() {
        let table = candidates();
        assert_eq!(table.iter().filter(|c| c.capability == Capability::Image).count(), 2);
        assert_eq!(table.iter().filter(|c| c.has_native_audio()).count(), 1);
    }

    #[test]
    fn test_fast_config_is_valid() {
        let config = fast_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.assembly.retry.jitter_strategy, JitterStrategy::None);
    }

    #[test]
    fn test_harness_ports_follow_speech_setting() {
        assert!(TestHarness::new().ports().has_speech());
        assert!(!TestHarness::new().without_speech().ports().has_speech());
    }
}
