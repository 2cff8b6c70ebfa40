//! Rubric-based quality gate for generated text.

mod gate;

pub use gate::{QualityGate, QualityOutcome};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{DEFAULT_MAX_REVISIONS, DEFAULT_QUALITY_THRESHOLD};

/// Highest score on the rubric scale.
pub const MAX_SCORE: f64 = 10.0;

/// One rubric dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricCriterion {
    /// Does the first line stop the scroll.
    HookStrength,
    /// Is the message easy to follow.
    Clarity,
    /// Will people interact with it.
    Engagement,
    /// Does it sound like the brand.
    BrandFit,
    /// Does it end with a clear ask.
    CallToAction,
}

impl RubricCriterion {
    /// Every criterion in rubric order.
    pub const ALL: [Self; 5] = [
        Self::HookStrength,
        Self::Clarity,
        Self::Engagement,
        Self::BrandFit,
        Self::CallToAction,
    ];

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::HookStrength => "hook strength",
            Self::Clarity => "clarity",
            Self::Engagement => "engagement",
            Self::BrandFit => "brand fit",
            Self::CallToAction => "call to action",
        }
    }
}

impl fmt::Display for RubricCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-criterion scores and their aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Score per criterion, 0–10.
    pub scores: BTreeMap<RubricCriterion, f64>,
    /// Mean of the criterion scores.
    pub aggregate: f64,
}

impl QualityScore {
    /// Builds a score, clamping each value to the rubric scale.
    ///
    /// Missing criteria count as zero.
    #[must_use]
    pub fn new(scores: impl IntoIterator<Item = (RubricCriterion, f64)>) -> Self {
        let mut map: BTreeMap<RubricCriterion, f64> =
            RubricCriterion::ALL.iter().map(|c| (*c, 0.0)).collect();
        for (criterion, value) in scores {
            map.insert(criterion, value.clamp(0.0, MAX_SCORE));
        }
        #[allow(clippy::cast_precision_loss)]
        let aggregate = map.values().sum::<f64>() / map.len() as f64;
        Self {
            scores: map,
            aggregate,
        }
    }

    /// Every criterion at `value`.
    #[must_use]
    pub fn uniform(value: f64) -> Self {
        Self::new(RubricCriterion::ALL.iter().map(|c| (*c, value)))
    }

    /// Score for one criterion.
    #[must_use]
    pub fn get(&self, criterion: RubricCriterion) -> f64 {
        self.scores.get(&criterion).copied().unwrap_or(0.0)
    }

    /// The `n` lowest-scoring criteria, lowest first; ties keep rubric order.
    #[must_use]
    pub fn weakest(&self, n: usize) -> Vec<(RubricCriterion, f64)> {
        let mut ranked: Vec<(RubricCriterion, f64)> =
            self.scores.iter().map(|(c, s)| (*c, *s)).collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(n);
        ranked
    }

    /// Revision guidance built from the two weakest criteria.
    #[must_use]
    pub fn feedback(&self) -> String {
        let weakest: Vec<String> = self
            .weakest(2)
            .into_iter()
            .map(|(c, s)| format!("{c} ({s:.1}/10)"))
            .collect();
        format!("Improve {}.", weakest.join(" and "))
    }

    /// Serializes to JSON for stage payloads and approval prompts.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Acceptance threshold and revision budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum aggregate to accept.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Revisions attempted before rejecting.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: usize,
}

fn default_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

fn default_max_revisions() -> usize {
    DEFAULT_MAX_REVISIONS
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_revisions: default_max_revisions(),
        }
    }
}
