//! Candidate backends and their static capability tables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media a candidate can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Still images.
    Image,
    /// Video clips.
    Video,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Output framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 9:16, the short-form default.
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
    /// 1:1.
    #[serde(rename = "1:1")]
    Square,
    /// 16:9.
    #[serde(rename = "16:9")]
    Landscape,
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portrait => write!(f, "9:16"),
            Self::Square => write!(f, "1:1"),
            Self::Landscape => write!(f, "16:9"),
        }
    }
}

/// What a candidate accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityTable {
    /// Discrete clip lengths the backend accepts. Empty means any length up
    /// to `max_duration`.
    #[serde(default)]
    pub supported_durations: Vec<f64>,
    /// Longest clip in seconds.
    pub max_duration: f64,
    /// Whether generated video carries its own audio track.
    #[serde(default)]
    pub native_audio: bool,
    /// Preferred framing. Informational; the router does not filter on it.
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

impl CapabilityTable {
    /// Creates a table accepting any duration up to `max_duration`.
    #[must_use]
    pub fn new(max_duration: f64) -> Self {
        Self {
            supported_durations: Vec::new(),
            max_duration,
            native_audio: false,
            aspect_ratio: AspectRatio::default(),
        }
    }

    /// Restricts the table to discrete durations.
    #[must_use]
    pub fn with_durations(mut self, durations: impl IntoIterator<Item = f64>) -> Self {
        self.supported_durations = durations.into_iter().collect();
        self
    }

    /// Marks the backend as producing its own audio.
    #[must_use]
    pub fn with_native_audio(mut self, native_audio: bool) -> Self {
        self.native_audio = native_audio;
        self
    }

    /// Sets the preferred framing.
    #[must_use]
    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// Snaps a requested duration to what this backend accepts.
    ///
    /// Picks the nearest supported value (ties go to the longer one), then
    /// clamps to `max_duration`.
    #[must_use]
    pub fn snap_duration(&self, requested: f64) -> f64 {
        let requested = requested.max(0.0);
        let snapped = self
            .supported_durations
            .iter()
            .copied()
            .fold(None::<f64>, |best, candidate| match best {
                None => Some(candidate),
                Some(current) => {
                    let current_gap = (current - requested).abs();
                    let candidate_gap = (candidate - requested).abs();
                    if candidate_gap < current_gap
                        || (candidate_gap == current_gap && candidate > current)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            })
            .unwrap_or(requested);
        snapped.min(self.max_duration)
    }
}

/// One interchangeable backend for a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    /// Stable identifier.
    pub id: String,
    /// Lower ranks are tried first.
    pub priority: u32,
    /// What this candidate generates.
    pub capability: Capability,
    /// What it accepts.
    pub table: CapabilityTable,
}

impl ProviderCandidate {
    /// Creates an image candidate.
    #[must_use]
    pub fn image(id: impl Into<String>, priority: u32) -> Self {
        Self {
            id: id.into(),
            priority,
            capability: Capability::Image,
            table: CapabilityTable::new(0.0),
        }
    }

    /// Creates a video candidate.
    #[must_use]
    pub fn video(id: impl Into<String>, priority: u32, table: CapabilityTable) -> Self {
        Self {
            id: id.into(),
            priority,
            capability: Capability::Video,
            table,
        }
    }

    /// Returns true if the candidate's clips carry their own audio.
    #[must_use]
    pub fn has_native_audio(&self) -> bool {
        self.table.native_audio
    }
}

/// Input for one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpec {
    /// Generation prompt.
    pub prompt: String,
    /// Requested length in seconds (video only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Output framing.
    #[serde(default)]
    pub aspect: AspectRatio,
}

impl GenerationSpec {
    /// Creates a spec with the default framing and no duration.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            duration: None,
            aspect: AspectRatio::default(),
        }
    }

    /// Sets the requested duration.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Sets the framing.
    #[must_use]
    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        self.aspect = aspect;
        self
    }

    /// The spec as `candidate` will receive it.
    #[must_use]
    pub fn snapped_for(&self, candidate: &ProviderCandidate) -> Self {
        let mut spec = self.clone();
        if candidate.capability == Capability::Video {
            if let Some(duration) = spec.duration {
                spec.duration = Some(candidate.table.snap_duration(duration));
            }
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_picks_nearest_supported() {
        let table = CapabilityTable::new(10.0).with_durations([4.0, 6.0, 8.0]);
        assert_eq!(table.snap_duration(6.4), 6.0);
        assert_eq!(table.snap_duration(7.6), 8.0);
        assert_eq!(table.snap_duration(1.0), 4.0);
    }

    #[test]
    fn test_snap_ties_go_longer() {
        let table = CapabilityTable::new(10.0).with_durations([5.0, 10.0]);
        assert_eq!(table.snap_duration(7.5), 10.0);
    }

    #[test]
    fn test_snap_clamps_to_max() {
        let table = CapabilityTable::new(8.0).with_durations([5.0, 10.0]);
        assert_eq!(table.snap_duration(9.5), 8.0);
    }

    #[test]
    fn test_snap_without_discrete_set() {
        let table = CapabilityTable::new(8.0);
        assert_eq!(table.snap_duration(6.3), 6.3);
        assert_eq!(table.snap_duration(12.0), 8.0);
    }

    #[test]
    fn test_spec_snapped_only_for_video() {
        let spec = GenerationSpec::new("surfers at dawn").with_duration(7.0);
        let image = ProviderCandidate::image("still-a", 0);
        let video = ProviderCandidate::video(
            "clip-a",
            0,
            CapabilityTable::new(10.0).with_durations([5.0, 10.0]),
        );

        assert_eq!(spec.snapped_for(&image).duration, Some(7.0));
        assert_eq!(spec.snapped_for(&video).duration, Some(5.0));
    }

    #[test]
    fn test_aspect_wire_format() {
        let json = serde_json::to_string(&AspectRatio::Landscape).unwrap();
        assert_eq!(json, "\"16:9\"");
    }
}
