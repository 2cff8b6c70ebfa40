//! Audio/video duration reconciliation.
//!
//! Narration that runs longer than its video is either trimmed with a short
//! fade or, when the overrun is large, regenerated from a shortened script.
//! Audio is never looped or padded.

mod engine;
mod script;

pub use engine::{DurationReconciler, Reconciled};
pub use script::{shorten_script, split_sentences, target_words, word_count};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{
    DEFAULT_FADE_OUT_SECS, DEFAULT_TRIM_MEDIUM_MAX_SECS, DEFAULT_TRIM_SMALL_MAX_SECS,
};

/// How a duration mismatch is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Audio fits; nothing to do.
    None,
    /// Small overrun trimmed with a fade.
    TrimSmall,
    /// Noticeable overrun trimmed; trailing content may be clipped.
    TrimMedium,
    /// Large overrun trimmed because regeneration was not possible.
    TrimLarge,
    /// Narration shortened and synthesized again.
    Regenerate,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::TrimSmall => write!(f, "trim_small"),
            Self::TrimMedium => write!(f, "trim_medium"),
            Self::TrimLarge => write!(f, "trim_large"),
            Self::Regenerate => write!(f, "regenerate"),
        }
    }
}

impl SyncAction {
    /// Returns true for the trim variants.
    #[must_use]
    pub fn is_trim(self) -> bool {
        matches!(self, Self::TrimSmall | Self::TrimMedium | Self::TrimLarge)
    }
}

/// Overrun thresholds and fade length, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Largest overrun handled by a plain trim (T1).
    #[serde(default = "default_small")]
    pub small: f64,
    /// Largest overrun trimmed before regenerating (T2).
    #[serde(default = "default_medium")]
    pub medium: f64,
    /// Fade-out applied on every trim (F).
    #[serde(default = "default_fade")]
    pub fade: f64,
}

fn default_small() -> f64 {
    DEFAULT_TRIM_SMALL_MAX_SECS
}

fn default_medium() -> f64 {
    DEFAULT_TRIM_MEDIUM_MAX_SECS
}

fn default_fade() -> f64 {
    DEFAULT_FADE_OUT_SECS
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            small: default_small(),
            medium: default_medium(),
            fade: default_fade(),
        }
    }
}

impl Thresholds {
    /// Creates thresholds from explicit values.
    #[must_use]
    pub fn new(small: f64, medium: f64, fade: f64) -> Self {
        Self {
            small,
            medium,
            fade,
        }
    }

    /// Trim variant for an overrun that is already known to need a trim.
    #[must_use]
    pub fn trim_for(&self, diff: f64) -> SyncAction {
        if diff <= self.small {
            SyncAction::TrimSmall
        } else if diff <= self.medium {
            SyncAction::TrimMedium
        } else {
            SyncAction::TrimLarge
        }
    }
}

/// Classifies an audio/video pair.
///
/// Never returns [`SyncAction::TrimLarge`]; that is only chosen when a
/// regeneration cannot be carried out.
#[must_use]
pub fn classify(audio: f64, video: f64, thresholds: &Thresholds) -> SyncAction {
    let diff = audio - video;
    if diff <= 0.0 {
        SyncAction::None
    } else if diff <= thresholds.small {
        SyncAction::TrimSmall
    } else if diff <= thresholds.medium {
        SyncAction::TrimMedium
    } else {
        SyncAction::Regenerate
    }
}

/// What reconciliation decided and produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDecision {
    /// Primary action.
    pub action: SyncAction,
    /// Trim applied to regenerated audio that still overran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup: Option<SyncAction>,
    /// Audio length before reconciliation.
    pub original_duration: f64,
    /// Video length the audio must fit.
    pub target_duration: f64,
    /// Audio length after reconciliation.
    pub final_duration: f64,
    /// Seconds removed (`original_duration - final_duration`).
    pub trimmed_seconds: f64,
    /// Content-loss warning for the reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Narration script used for the regenerated audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortened_script: Option<String>,
}

impl SyncDecision {
    fn new(action: SyncAction, original: f64, target: f64, final_duration: f64) -> Self {
        Self {
            action,
            followup: None,
            original_duration: original,
            target_duration: target,
            final_duration,
            trimmed_seconds: (original - final_duration).max(0.0),
            warning: None,
            shortened_script: None,
        }
    }

    /// Returns true if any content was cut or rewritten.
    #[must_use]
    pub fn changed_audio(&self) -> bool {
        self.action != SyncAction::None
    }

    /// Serializes to JSON for stage payloads.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Warning text for a trim of `diff` seconds.
pub(crate) fn trim_warning(action: SyncAction, diff: f64) -> Option<String> {
    match action {
        SyncAction::TrimMedium => Some(format!(
            "Narration trimmed by {diff:.1}s; the closing call to action may be clipped"
        )),
        SyncAction::TrimLarge => Some(format!(
            "Narration trimmed by {diff:.1}s without rewriting; trailing content is lost"
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let t = Thresholds::default();
        assert_eq!(classify(8.0, 8.0, &t), SyncAction::None);
        assert_eq!(classify(7.2, 8.0, &t), SyncAction::None);
        assert_eq!(classify(9.0, 8.0, &t), SyncAction::TrimSmall);
        assert_eq!(classify(9.4, 8.0, &t), SyncAction::TrimMedium);
        assert_eq!(classify(11.0, 8.0, &t), SyncAction::TrimMedium);
        assert_eq!(classify(11.1, 8.0, &t), SyncAction::Regenerate);
    }

    #[test]
    fn test_classify_respects_overrides() {
        let t = Thresholds::new(0.5, 1.0, 0.25);
        assert_eq!(classify(8.8, 8.0, &t), SyncAction::TrimMedium);
        assert_eq!(classify(9.5, 8.0, &t), SyncAction::Regenerate);
    }

    #[test]
    fn test_trim_for_escalates_to_large() {
        let t = Thresholds::default();
        assert_eq!(t.trim_for(0.4), SyncAction::TrimSmall);
        assert_eq!(t.trim_for(2.0), SyncAction::TrimMedium);
        assert_eq!(t.trim_for(3.5), SyncAction::TrimLarge);
    }

    #[test]
    fn test_thresholds_deserialize_with_defaults() {
        let t: Thresholds = serde_json::from_str(r#"{"medium": 4.0}"#).unwrap();
        assert_eq!(t.small, DEFAULT_TRIM_SMALL_MAX_SECS);
        assert_eq!(t.medium, 4.0);
        assert_eq!(t.fade, DEFAULT_FADE_OUT_SECS);
    }
}
