//! Scoring and the bounded revise-and-recheck loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{QualityConfig, QualityScore};
use crate::errors::{PostflowError, ProviderError};
use crate::stages::ports::{QualityScorer, TextGenerator};

/// Accepted text and how it got there.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityOutcome {
    /// The accepted text (possibly revised).
    pub text: String,
    /// Its score.
    pub score: QualityScore,
    /// Revisions made before acceptance.
    pub revisions: usize,
    /// Aggregate after each scoring pass, first pass included.
    pub history: Vec<f64>,
}

/// Scores text and, in autonomous runs, revises it until it passes.
#[derive(Clone)]
pub struct QualityGate {
    scorer: Arc<dyn QualityScorer>,
    config: QualityConfig,
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QualityGate {
    /// Creates a gate with default threshold and revision budget.
    #[must_use]
    pub fn new(scorer: Arc<dyn QualityScorer>) -> Self {
        Self {
            scorer,
            config: QualityConfig::default(),
        }
    }

    /// Overrides threshold and budget.
    #[must_use]
    pub fn with_config(mut self, config: QualityConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Returns true if `score` meets the threshold.
    #[must_use]
    pub fn passes(&self, score: &QualityScore) -> bool {
        score.aggregate >= self.config.threshold
    }

    /// Scores `text` once.
    pub async fn assess(&self, text: &str) -> Result<QualityScore, ProviderError> {
        let score = self.scorer.score(text).await?;
        debug!(aggregate = score.aggregate, threshold = self.config.threshold, "Scored text");
        Ok(score)
    }

    /// Scores `text`, asking `reviser` for up to `max_revisions` rewrites
    /// while it stays below the threshold.
    ///
    /// Fails with [`PostflowError::QualityRejected`] once the budget is spent.
    pub async fn evaluate_with_revisions(
        &self,
        text: &str,
        reviser: &dyn TextGenerator,
        timeout: Duration,
    ) -> Result<QualityOutcome, PostflowError> {
        let mut current = text.to_string();
        let mut score = self.assess(&current).await?;
        let mut history = vec![score.aggregate];
        let mut revisions = 0;

        while !self.passes(&score) {
            if revisions >= self.config.max_revisions {
                info!(
                    aggregate = score.aggregate,
                    threshold = self.config.threshold,
                    revisions,
                    "Quality rejected"
                );
                return Err(PostflowError::QualityRejected {
                    aggregate: score.aggregate,
                    threshold: self.config.threshold,
                    revisions,
                });
            }

            let feedback = score.feedback();
            debug!(revision = revisions + 1, feedback, "Requesting revision");
            current = reviser
                .generate(&revision_prompt(&current, &feedback), timeout)
                .await?;
            revisions += 1;
            score = self.assess(&current).await?;
            history.push(score.aggregate);
        }

        Ok(QualityOutcome {
            text: current,
            score,
            revisions,
            history,
        })
    }
}

fn revision_prompt(text: &str, feedback: &str) -> String {
    format!(
        "Rewrite this social media post. Keep the topic and length. {feedback}\n\n{text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedScorer, ScriptedTextGenerator};

    #[tokio::test]
    async fn test_passing_text_needs_no_revision() {
        let scorer = Arc::new(ScriptedScorer::new().with_aggregates([8.0]));
        let gate = QualityGate::new(scorer.clone());
        let reviser = ScriptedTextGenerator::new();

        let outcome = gate
            .evaluate_with_revisions("Great caption", &reviser, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.revisions, 0);
        assert_eq!(outcome.text, "Great caption");
        assert!(reviser.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_revision_can_rescue_text() {
        let scorer = Arc::new(ScriptedScorer::new().with_aggregates([5.0, 7.5]));
        let gate = QualityGate::new(scorer);
        let reviser = ScriptedTextGenerator::new().with_responses(["Sharper caption"]);

        let outcome = gate
            .evaluate_with_revisions("Weak caption", &reviser, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.revisions, 1);
        assert_eq!(outcome.text, "Sharper caption");
        assert_eq!(outcome.history, vec![5.0, 7.5]);
        assert!(reviser.prompts()[0].contains("Weak caption"));
    }

    #[tokio::test]
    async fn test_revisions_are_bounded() {
        let scorer = Arc::new(ScriptedScorer::new().with_aggregates([3.0; 10]));
        let gate = QualityGate::new(scorer.clone());
        let reviser = ScriptedTextGenerator::new();

        let err = gate
            .evaluate_with_revisions("Flat caption", &reviser, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, PostflowError::QualityRejected { revisions: 2, .. }));
        assert_eq!(err.kind(), "quality_rejected");
        assert_eq!(reviser.prompts().len(), 2);
        assert_eq!(scorer.texts().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_budget_rejects_immediately() {
        let scorer = Arc::new(ScriptedScorer::new().with_aggregates([6.9]));
        let gate = QualityGate::new(scorer).with_config(QualityConfig {
            threshold: 7.0,
            max_revisions: 0,
        });
        let reviser = ScriptedTextGenerator::new();

        let err = gate
            .evaluate_with_revisions("Almost", &reviser, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, PostflowError::QualityRejected { revisions: 0, .. }));
        assert!(reviser.prompts().is_empty());
    }
}
