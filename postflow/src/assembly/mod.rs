//! Multi-segment video assembly.
//!
//! Long videos are planned as several provider-sized clips, generated in
//! parallel under a concurrency limit, retried by index, and chained back
//! together with crossfades.

mod crossfade;
mod engine;
mod plan;

pub use crossfade::{crossfade_offsets, crossfaded_duration};
pub use engine::{AssembledVideo, SegmentAssembler};
pub use plan::{PlannedSegment, SegmentPlan, SegmentRole};

use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_CROSSFADE_SECS, DEFAULT_MIN_SEGMENTS, DEFAULT_SEGMENT_CONCURRENCY,
    DEFAULT_SEGMENT_RETRY_ROUNDS,
};
use crate::retry::RetryConfig;

/// Fan-out, retry and transition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Segment jobs in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Retry rounds for failed segments after the first pass.
    #[serde(default = "default_retry_rounds")]
    pub retry_rounds: u32,
    /// Fewest successful segments that still make a video.
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,
    /// Crossfade length in seconds; zero joins with hard cuts.
    #[serde(default = "default_crossfade")]
    pub crossfade_secs: f64,
    /// Delay between retry rounds.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_concurrency() -> usize {
    DEFAULT_SEGMENT_CONCURRENCY
}

fn default_retry_rounds() -> u32 {
    DEFAULT_SEGMENT_RETRY_ROUNDS
}

fn default_min_segments() -> usize {
    DEFAULT_MIN_SEGMENTS
}

fn default_crossfade() -> f64 {
    DEFAULT_CROSSFADE_SECS
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_rounds: default_retry_rounds(),
            min_segments: default_min_segments(),
            crossfade_secs: default_crossfade(),
            retry: RetryConfig::default(),
        }
    }
}
