//! Splitting a target duration into role-tagged segments.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::AssemblyError;

const OPENING_SHOTS: &[&str] = &[
    "slow push-in establishing shot",
    "aerial reveal",
    "close-up detail pulling back to wide",
    "tracking shot entering the scene",
];

const DEVELOPMENT_SHOTS: &[&str] = &[
    "handheld medium shot",
    "smooth lateral dolly",
    "over-the-shoulder angle",
    "macro detail insert",
    "low-angle tracking shot",
];

const CLOSING_SHOTS: &[&str] = &[
    "slow pull-back to wide",
    "golden-hour silhouette",
    "static hero frame",
    "crane up and away",
];

/// Narrative position of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentRole {
    /// First segment.
    Opening,
    /// Any middle segment.
    Development,
    /// Last segment.
    Closing,
}

impl SegmentRole {
    /// Role of segment `index` in a plan of `count`.
    #[must_use]
    pub fn for_index(index: usize, count: usize) -> Self {
        if index == 0 {
            Self::Opening
        } else if index + 1 == count {
            Self::Closing
        } else {
            Self::Development
        }
    }

    /// Camera/style descriptors for this role.
    #[must_use]
    pub fn descriptor_pool(self) -> &'static [&'static str] {
        match self {
            Self::Opening => OPENING_SHOTS,
            Self::Development => DEVELOPMENT_SHOTS,
            Self::Closing => CLOSING_SHOTS,
        }
    }
}

impl fmt::Display for SegmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opening => write!(f, "opening"),
            Self::Development => write!(f, "development"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// One planned clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSegment {
    /// Position in the final video.
    pub index: usize,
    /// Narrative role.
    pub role: SegmentRole,
    /// Requested length in seconds.
    pub duration: f64,
    /// Scene description.
    pub scene: String,
    /// Camera/style descriptor drawn for this segment.
    pub descriptor: String,
}

impl PlannedSegment {
    /// Generation prompt for this segment.
    #[must_use]
    pub fn prompt(&self) -> String {
        format!("{}. Camera: {}.", self.scene.trim_end_matches('.'), self.descriptor)
    }
}

/// Ordered segment list for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
    /// Segments in playback order.
    pub segments: Vec<PlannedSegment>,
    /// Requested total length.
    pub total_duration: f64,
}

impl SegmentPlan {
    /// `max(2, ceil(total / max_clip))`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn segment_count(total: f64, max_clip: f64) -> usize {
        ((total / max_clip).ceil() as usize).max(2)
    }

    /// Plans segments for `total` seconds of video from `max_clip`-second clips.
    ///
    /// Scenes cycle through `beats`; with no beats each segment is described
    /// by its role.
    pub fn build<R: Rng + ?Sized>(
        total: f64,
        max_clip: f64,
        beats: &[String],
        rng: &mut R,
    ) -> Result<Self, AssemblyError> {
        if !total.is_finite() || total <= 0.0 {
            return Err(AssemblyError::Plan(format!("invalid target duration {total}")));
        }
        if !max_clip.is_finite() || max_clip <= 0.0 {
            return Err(AssemblyError::Plan(format!("invalid clip limit {max_clip}")));
        }

        let count = Self::segment_count(total, max_clip);
        #[allow(clippy::cast_precision_loss)]
        let duration = total / count as f64;

        let mut previous: Option<&str> = None;
        let segments = (0..count)
            .map(|index| {
                let role = SegmentRole::for_index(index, count);
                let descriptor = draw_descriptor(role, previous, rng);
                previous = Some(descriptor);
                let scene = if beats.is_empty() {
                    format!("{role} scene")
                } else {
                    beats[index % beats.len()].clone()
                };
                PlannedSegment {
                    index,
                    role,
                    duration,
                    scene,
                    descriptor: descriptor.to_string(),
                }
            })
            .collect();

        Ok(Self {
            segments,
            total_duration: total,
        })
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the plan has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn draw_descriptor<R: Rng + ?Sized>(
    role: SegmentRole,
    previous: Option<&str>,
    rng: &mut R,
) -> &'static str {
    let pool: Vec<&'static str> = role
        .descriptor_pool()
        .iter()
        .copied()
        .filter(|d| Some(*d) != previous)
        .collect();
    pool.choose(rng)
        .copied()
        .unwrap_or(role.descriptor_pool()[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_segment_count() {
        assert_eq!(SegmentPlan::segment_count(30.0, 10.0), 3);
        assert_eq!(SegmentPlan::segment_count(31.0, 10.0), 4);
        assert_eq!(SegmentPlan::segment_count(6.0, 10.0), 2);
    }

    #[test]
    fn test_roles_and_even_durations() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = SegmentPlan::build(32.0, 8.0, &[], &mut rng).unwrap();

        assert_eq!(plan.len(), 4);
        assert_eq!(plan.segments[0].role, SegmentRole::Opening);
        assert_eq!(plan.segments[1].role, SegmentRole::Development);
        assert_eq!(plan.segments[2].role, SegmentRole::Development);
        assert_eq!(plan.segments[3].role, SegmentRole::Closing);
        assert!(plan.segments.iter().all(|s| (s.duration - 8.0).abs() < 1e-9));
    }

    #[test]
    fn test_descriptor_never_repeats_back_to_back() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = SegmentPlan::build(80.0, 8.0, &[], &mut rng).unwrap();
            for pair in plan.segments.windows(2) {
                assert_ne!(pair[0].descriptor, pair[1].descriptor, "seed {seed}");
            }
            for segment in &plan.segments {
                assert!(segment.role.descriptor_pool().contains(&segment.descriptor.as_str()));
            }
        }
    }

    #[test]
    fn test_scenes_cycle_through_beats() {
        let beats = vec!["Boats leave the harbor".to_string(), "Nets come up full".to_string()];
        let mut rng = StdRng::seed_from_u64(1);
        let plan = SegmentPlan::build(24.0, 8.0, &beats, &mut rng).unwrap();

        assert_eq!(plan.segments[0].scene, beats[0]);
        assert_eq!(plan.segments[1].scene, beats[1]);
        assert_eq!(plan.segments[2].scene, beats[0]);
        assert!(plan.segments[0].prompt().starts_with("Boats leave the harbor. Camera: "));
    }

    #[test]
    fn test_invalid_inputs() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(SegmentPlan::build(0.0, 8.0, &[], &mut rng).is_err());
        assert!(SegmentPlan::build(30.0, 0.0, &[], &mut rng).is_err());
    }
}
