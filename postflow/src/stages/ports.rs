//! Ports - the capability contracts the orchestrator calls out to.
//!
//! Every generative backend, the media editor, the publisher and the
//! approval surface are external collaborators. Stages only see these
//! narrow traits, bundled in [`StagePorts`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::approval::ActionTag;
use crate::core::ArtifactRef;
use crate::errors::ProviderError;
use crate::providers::{Capability, GenerationSpec, ProviderCandidate};
use crate::quality::QualityScore;

/// Text generation (topics, captions, scripts, revisions).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for a prompt within the given deadline.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError>;
}

/// Image and video generation on a specific candidate backend.
#[async_trait]
pub trait MediaGenerator: Send + Sync {
    /// Generates one artifact using `candidate`.
    ///
    /// `spec.duration` has already been snapped to the candidate's
    /// supported durations by the router.
    async fn generate(
        &self,
        capability: Capability,
        spec: &GenerationSpec,
        candidate: &ProviderCandidate,
    ) -> Result<ArtifactRef, ProviderError>;
}

/// Synthesized narration and its measured length.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// The audio track.
    pub artifact: ArtifactRef,
    /// Length in seconds.
    pub duration: f64,
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes `text` into an audio track.
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, ProviderError>;
}

/// Deterministic media operations (probe, trim, crossfade, concat, mux).
#[async_trait]
pub trait MediaEditor: Send + Sync {
    /// Measures the real duration of a clip in seconds.
    async fn probe_duration(&self, artifact: &ArtifactRef) -> Result<f64, ProviderError>;

    /// Cuts `audio` to `duration` seconds with a `fade_out`-second fade at the end.
    async fn trim_audio(
        &self,
        audio: &ArtifactRef,
        duration: f64,
        fade_out: f64,
    ) -> Result<ArtifactRef, ProviderError>;

    /// Blends `second` into `first`, starting the transition at `offset` seconds.
    async fn crossfade(
        &self,
        first: &ArtifactRef,
        second: &ArtifactRef,
        offset: f64,
        fade: f64,
    ) -> Result<ArtifactRef, ProviderError>;

    /// Joins clips back to back with hard cuts.
    async fn concat(&self, clips: &[ArtifactRef]) -> Result<ArtifactRef, ProviderError>;

    /// Lays `audio` over `video`.
    async fn mux(&self, video: &ArtifactRef, audio: &ArtifactRef) -> Result<ArtifactRef, ProviderError>;
}

/// Social platform publishing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes an artifact with a caption; returns the remote post id.
    async fn publish(
        &self,
        artifact: &ArtifactRef,
        caption: &str,
        platform: &str,
    ) -> Result<String, ProviderError>;
}

/// Approval and observability surface (chat front-end, dashboards).
///
/// Calls are fire-and-forget: the orchestrator logs failures and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a message, optionally with an artifact preview and the actions
    /// the recipient may answer with.
    async fn notify(
        &self,
        message: &str,
        artifact: Option<&ArtifactRef>,
        options: &[ActionTag],
    ) -> Result<(), ProviderError>;
}

/// Rubric scoring for generated text.
#[async_trait]
pub trait QualityScorer: Send + Sync {
    /// Scores `text` against the quality rubric.
    async fn score(&self, text: &str) -> Result<QualityScore, ProviderError>;
}

/// A notifier that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(
        &self,
        _message: &str,
        _artifact: Option<&ArtifactRef>,
        _options: &[ActionTag],
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Combined collaborator container handed to the state machine.
#[derive(Clone)]
pub struct StagePorts {
    /// Text generation.
    pub text: Arc<dyn TextGenerator>,
    /// Image/video generation.
    pub media: Arc<dyn MediaGenerator>,
    /// Media editing.
    pub editor: Arc<dyn MediaEditor>,
    /// Publishing.
    pub publisher: Arc<dyn Publisher>,
    /// Quality scoring.
    pub scorer: Arc<dyn QualityScorer>,
    /// Speech synthesis; video recipes without it cannot regenerate narration.
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    /// Approval/observability surface.
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for StagePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePorts")
            .field("has_speech", &self.speech.is_some())
            .finish_non_exhaustive()
    }
}

impl StagePorts {
    /// Creates the port bundle with the required collaborators.
    #[must_use]
    pub fn new(
        text: Arc<dyn TextGenerator>,
        media: Arc<dyn MediaGenerator>,
        editor: Arc<dyn MediaEditor>,
        publisher: Arc<dyn Publisher>,
        scorer: Arc<dyn QualityScorer>,
    ) -> Self {
        Self {
            text,
            media,
            editor,
            publisher,
            scorer,
            speech: None,
            notifier: Arc::new(NoOpNotifier),
        }
    }

    /// Sets the speech synthesizer.
    #[must_use]
    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Sets the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Returns true if narration can be synthesized.
    #[must_use]
    pub fn has_speech(&self) -> bool {
        self.speech.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_notifier_accepts_everything() {
        let notifier = NoOpNotifier;
        let result = notifier
            .notify("hello", Some(&ArtifactRef::image("a.png")), &[ActionTag::Approve])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_mock_publisher() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, caption, platform| Ok(format!("{platform}:{caption}")));

        let remote = publisher
            .publish(&ArtifactRef::image("a.png"), "hi", "instagram")
            .await
            .unwrap();
        assert_eq!(remote, "instagram:hi");
    }
}
