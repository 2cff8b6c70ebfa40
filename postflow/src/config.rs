//! Pipeline configuration.
//!
//! Every tunable has a named default here; [`PipelineConfig`] is the single
//! override point, loadable from JSON and adjusted with `with_*` builders.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::assembly::AssemblyConfig;
use crate::errors::ConfigError;
use crate::providers::AspectRatio;
use crate::quality::QualityConfig;
use crate::reconcile::Thresholds;

/// Largest overrun, in seconds, fixed with a plain trim (T1).
pub const DEFAULT_TRIM_SMALL_MAX_SECS: f64 = 1.0;
/// Largest overrun, in seconds, trimmed instead of regenerated (T2).
pub const DEFAULT_TRIM_MEDIUM_MAX_SECS: f64 = 3.0;
/// Fade-out applied to trimmed narration (F).
pub const DEFAULT_FADE_OUT_SECS: f64 = 0.5;
/// Narration pace used to size shortened scripts.
pub const DEFAULT_WORDS_PER_SECOND: f64 = 2.5;
/// How long a human has to answer an approval request.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 3600;
/// Deadline for text generation calls.
pub const DEFAULT_TEXT_TIMEOUT_SECS: u64 = 120;
/// Deadline for a single media candidate.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 300;
/// Segment jobs in flight at once.
pub const DEFAULT_SEGMENT_CONCURRENCY: usize = 3;
/// Retry rounds for failed segments.
pub const DEFAULT_SEGMENT_RETRY_ROUNDS: u32 = 3;
/// Fewest segments that still make a video.
pub const DEFAULT_MIN_SEGMENTS: usize = 2;
/// Crossfade between segments.
pub const DEFAULT_CROSSFADE_SECS: f64 = 0.5;
/// Minimum aggregate quality score.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 7.0;
/// Automatic revisions before a quality rejection.
pub const DEFAULT_MAX_REVISIONS: usize = 2;
/// Video length when a run does not ask for one.
pub const DEFAULT_VIDEO_DURATION_SECS: f64 = 30.0;

/// Top-level configuration for a [`PipelineStateMachine`](crate::pipeline::PipelineStateMachine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Approval timeout in seconds.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
    /// Text generation timeout in seconds.
    #[serde(default = "default_text_timeout")]
    pub text_timeout_secs: u64,
    /// Per-candidate media timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    /// Reconciliation thresholds and fade.
    #[serde(default)]
    pub reconcile: Thresholds,
    /// Narration pace.
    #[serde(default = "default_words_per_second")]
    pub words_per_second: f64,
    /// Segment assembly settings.
    #[serde(default)]
    pub assembly: AssemblyConfig,
    /// Quality threshold and revision budget.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Video length used when the run input has none.
    #[serde(default = "default_video_duration")]
    pub default_video_secs: f64,
    /// Framing used when the run input has none.
    #[serde(default)]
    pub default_aspect: AspectRatio,
    /// Platforms published to when the run input names none.
    #[serde(default = "default_platforms")]
    pub default_platforms: Vec<String>,
}

fn default_approval_timeout() -> u64 {
    DEFAULT_APPROVAL_TIMEOUT_SECS
}

fn default_text_timeout() -> u64 {
    DEFAULT_TEXT_TIMEOUT_SECS
}

fn default_provider_timeout() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_words_per_second() -> f64 {
    DEFAULT_WORDS_PER_SECOND
}

fn default_video_duration() -> f64 {
    DEFAULT_VIDEO_DURATION_SECS
}

fn default_platforms() -> Vec<String> {
    vec!["instagram".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: default_approval_timeout(),
            text_timeout_secs: default_text_timeout(),
            provider_timeout_secs: default_provider_timeout(),
            reconcile: Thresholds::default(),
            words_per_second: default_words_per_second(),
            assembly: AssemblyConfig::default(),
            quality: QualityConfig::default(),
            default_video_secs: default_video_duration(),
            default_aspect: AspectRatio::default(),
            default_platforms: default_platforms(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::new("<document>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("parsing pipeline config {}", path.display()))
    }

    /// Rejects inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.approval_timeout_secs == 0 {
            return Err(ConfigError::new("approval_timeout_secs", "must be positive"));
        }
        if self.text_timeout_secs == 0 {
            return Err(ConfigError::new("text_timeout_secs", "must be positive"));
        }
        if self.provider_timeout_secs == 0 {
            return Err(ConfigError::new("provider_timeout_secs", "must be positive"));
        }
        let t = &self.reconcile;
        if !(t.small >= 0.0 && t.medium >= 0.0) {
            return Err(ConfigError::new("reconcile", "thresholds must be non-negative"));
        }
        if t.small > t.medium {
            return Err(ConfigError::new(
                "reconcile.small",
                format!("T1 ({}) exceeds T2 ({})", t.small, t.medium),
            ));
        }
        if !(t.fade >= 0.0) {
            return Err(ConfigError::new("reconcile.fade", "must be non-negative"));
        }
        if !(self.words_per_second > 0.0) {
            return Err(ConfigError::new("words_per_second", "must be positive"));
        }
        if self.assembly.concurrency == 0 {
            return Err(ConfigError::new("assembly.concurrency", "must be at least 1"));
        }
        if self.assembly.min_segments < 2 {
            return Err(ConfigError::new("assembly.min_segments", "must be at least 2"));
        }
        if !(self.assembly.crossfade_secs >= 0.0) {
            return Err(ConfigError::new("assembly.crossfade_secs", "must be non-negative"));
        }
        if !(0.0..=crate::quality::MAX_SCORE).contains(&self.quality.threshold) {
            return Err(ConfigError::new("quality.threshold", "must be within 0-10"));
        }
        if !(self.default_video_secs > 0.0) {
            return Err(ConfigError::new("default_video_secs", "must be positive"));
        }
        Ok(())
    }

    /// Approval timeout as a duration.
    #[must_use]
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    /// Text generation timeout as a duration.
    #[must_use]
    pub fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_secs)
    }

    /// Per-candidate media timeout as a duration.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Sets the approval timeout.
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the per-candidate media timeout.
    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the reconciliation thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.reconcile = thresholds;
        self
    }

    /// Sets the segment assembly settings.
    #[must_use]
    pub fn with_assembly(mut self, assembly: AssemblyConfig) -> Self {
        self.assembly = assembly;
        self
    }

    /// Sets the quality threshold and revision budget.
    #[must_use]
    pub fn with_quality(mut self, threshold: f64, max_revisions: usize) -> Self {
        self.quality = QualityConfig {
            threshold,
            max_revisions,
        };
        self
    }

    /// Sets the default video length.
    #[must_use]
    pub fn with_default_video_secs(mut self, seconds: f64) -> Self {
        self.default_video_secs = seconds;
        self
    }

    /// Sets the default publishing platforms.
    #[must_use]
    pub fn with_default_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_platforms = platforms.into_iter().map(Into::into).collect();
        self
    }
}
