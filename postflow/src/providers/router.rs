//! Priority-ordered fallback across interchangeable generation backends.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Capability, GenerationSpec, ProviderCandidate};
use crate::core::ArtifactRef;
use crate::errors::{ProviderError, RouterError};
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::ports::MediaGenerator;

/// Default per-candidate deadline.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration =
    Duration::from_secs(crate::config::DEFAULT_PROVIDER_TIMEOUT_SECS);

/// Per-request adjustments to the candidate order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOptions {
    /// Candidate to try first, if eligible.
    #[serde(default)]
    pub preferred: Option<String>,
    /// Candidates to skip.
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Only consider candidates that produce their own audio.
    #[serde(default)]
    pub require_native_audio: bool,
}

impl RouteOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `id` to the front.
    #[must_use]
    pub fn prefer(mut self, id: impl Into<String>) -> Self {
        self.preferred = Some(id.into());
        self
    }

    /// Skips `id`.
    #[must_use]
    pub fn exclude(mut self, id: impl Into<String>) -> Self {
        self.excluded.push(id.into());
        self
    }

    /// Restricts routing to native-audio candidates.
    #[must_use]
    pub fn with_native_audio(mut self) -> Self {
        self.require_native_audio = true;
        self
    }
}

/// A resolved generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Candidate that produced the artifact.
    pub provider_used: String,
    /// Requested capability.
    pub capability: Capability,
    /// Spec as sent to the successful candidate (duration snapped).
    pub spec: GenerationSpec,
    /// Candidates invoked, including the successful one.
    pub attempts: u32,
    /// The generated artifact.
    pub artifact: ArtifactRef,
    /// Candidates that failed before the successful one, in order.
    pub fallback_from: Vec<String>,
    /// Their errors, aligned with `fallback_from`.
    pub errors: Vec<ProviderError>,
}

impl GenerationJob {
    /// Returns true if the first candidate did not succeed.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        !self.fallback_from.is_empty()
    }

    /// Serializes to JSON for stage payloads.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Tries candidates in priority order until one succeeds.
///
/// The candidate table is read-only and shared across runs.
#[derive(Clone)]
pub struct FallbackRouter {
    candidates: Arc<[ProviderCandidate]>,
    timeout: Duration,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("candidates", &self.candidates.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl FallbackRouter {
    /// Creates a router over a candidate table.
    #[must_use]
    pub fn new(candidates: impl Into<Arc<[ProviderCandidate]>>) -> Self {
        Self {
            candidates: candidates.into(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the per-candidate deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the sink receiving `provider.fallback` events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The full candidate table.
    #[must_use]
    pub fn candidates(&self) -> &[ProviderCandidate] {
        &self.candidates
    }

    /// Eligible candidates for `capability` in the order they would be tried.
    ///
    /// Ascending priority with table order kept on ties; duplicate ids are
    /// dropped; the preferred candidate, if eligible, moves to the front.
    #[must_use]
    pub fn ordered(&self, capability: Capability, options: &RouteOptions) -> Vec<&ProviderCandidate> {
        let mut seen = HashSet::new();
        let mut ordered: Vec<&ProviderCandidate> = self
            .candidates
            .iter()
            .filter(|c| c.capability == capability)
            .filter(|c| !options.excluded.contains(&c.id))
            .filter(|c| !options.require_native_audio || c.has_native_audio())
            .collect();
        ordered.sort_by_key(|c| c.priority);
        ordered.retain(|c| seen.insert(c.id.clone()));

        if let Some(preferred) = options.preferred.as_deref() {
            if let Some(pos) = ordered.iter().position(|c| c.id == preferred) {
                let candidate = ordered.remove(pos);
                ordered.insert(0, candidate);
            }
        }
        ordered
    }

    /// Longest clip any eligible candidate accepts.
    #[must_use]
    pub fn max_clip_duration(&self, capability: Capability, options: &RouteOptions) -> Option<f64> {
        self.ordered(capability, options)
            .into_iter()
            .map(|c| c.table.max_duration)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
    }

    /// Generates an artifact, falling back across candidates on failure.
    pub async fn route(
        &self,
        generator: &dyn MediaGenerator,
        capability: Capability,
        spec: &GenerationSpec,
        options: &RouteOptions,
    ) -> Result<GenerationJob, RouterError> {
        let candidates = self.ordered(capability, options);
        if candidates.is_empty() {
            return Err(RouterError::NoCandidates {
                capability: capability.to_string(),
            });
        }

        let mut fallback_from = Vec::new();
        let mut errors: Vec<ProviderError> = Vec::new();

        for candidate in candidates {
            let snapped = spec.snapped_for(candidate);
            debug!(
                candidate = %candidate.id,
                %capability,
                duration = ?snapped.duration,
                "Invoking candidate"
            );

            let outcome = match tokio::time::timeout(
                self.timeout,
                generator.generate(capability, &snapped, candidate),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(
                    candidate.id.clone(),
                    self.timeout.as_secs_f64(),
                )),
            };

            match outcome {
                Ok(artifact) => {
                    if !fallback_from.is_empty() {
                        info!(
                            candidate = %candidate.id,
                            fallback_from = ?fallback_from,
                            "Generated after fallback"
                        );
                    }
                    let attempts = u32::try_from(fallback_from.len() + 1).unwrap_or(u32::MAX);
                    return Ok(GenerationJob {
                        provider_used: candidate.id.clone(),
                        capability,
                        spec: snapped,
                        attempts,
                        artifact,
                        fallback_from,
                        errors,
                    });
                }
                Err(err) => {
                    warn!(candidate = %candidate.id, error = %err, "Candidate failed");
                    self.event_sink.try_emit(
                        "provider.fallback",
                        Some(serde_json::json!({
                            "capability": capability.to_string(),
                            "candidate": candidate.id,
                            "error": err.to_string(),
                            "timeout": err.is_timeout(),
                        })),
                    );
                    fallback_from.push(candidate.id.clone());
                    errors.push(err);
                }
            }
        }

        let last_error = errors
            .pop()
            .unwrap_or_else(|| ProviderError::failed("router", "no candidate attempted"));
        Err(RouterError::Exhausted {
            capability: capability.to_string(),
            attempted: fallback_from,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::providers::CapabilityTable;
    use crate::testing::ScriptedMediaGenerator;

    fn chain() -> Vec<ProviderCandidate> {
        vec![
            ProviderCandidate::video("A", 0, CapabilityTable::new(10.0)),
            ProviderCandidate::video("B", 1, CapabilityTable::new(10.0)),
            ProviderCandidate::video("C", 2, CapabilityTable::new(10.0)),
        ]
    }

    #[tokio::test]
    async fn test_falls_back_to_next_candidate() {
        let generator = ScriptedMediaGenerator::new().fail_candidate("A");
        let sink = Arc::new(CollectingEventSink::new());
        let router = FallbackRouter::new(chain()).with_event_sink(sink.clone());

        let job = router
            .route(
                &generator,
                Capability::Video,
                &GenerationSpec::new("harbor timelapse").with_duration(8.0),
                &RouteOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(job.provider_used, "B");
        assert_eq!(job.fallback_from, vec!["A".to_string()]);
        assert_eq!(job.attempts, 2);
        assert_eq!(generator.calls(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(sink.events_of_type("provider.fallback").len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_attempt() {
        let generator = ScriptedMediaGenerator::new()
            .fail_candidate("A")
            .fail_candidate("B")
            .fail_candidate("C");
        let router = FallbackRouter::new(chain());

        let err = router
            .route(
                &generator,
                Capability::Video,
                &GenerationSpec::new("harbor timelapse"),
                &RouteOptions::new(),
            )
            .await
            .unwrap_err();

        match err {
            RouterError::Exhausted {
                attempted,
                last_error,
                ..
            } => {
                assert_eq!(attempted, vec!["A", "B", "C"]);
                assert_eq!(last_error.source_id, "C");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_invoked_once() {
        let mut candidates = chain();
        candidates.push(ProviderCandidate::video("A", 5, CapabilityTable::new(10.0)));
        let generator = ScriptedMediaGenerator::new()
            .fail_candidate("A")
            .fail_candidate("B")
            .fail_candidate("C");
        let router = FallbackRouter::new(candidates);

        let _ = router
            .route(
                &generator,
                Capability::Video,
                &GenerationSpec::new("x"),
                &RouteOptions::new(),
            )
            .await;

        let calls = generator.calls();
        assert_eq!(calls.iter().filter(|c| *c == "A").count(), 1);
        assert_eq!(calls.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let generator = ScriptedMediaGenerator::new().stall_candidate("A");
        let router = FallbackRouter::new(chain()).with_timeout(Duration::from_secs(30));

        let job = router
            .route(
                &generator,
                Capability::Video,
                &GenerationSpec::new("x"),
                &RouteOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(job.provider_used, "B");
        assert!(job.errors[0].is_timeout());
    }

    #[test]
    fn test_ordering_options() {
        let mut candidates = chain();
        candidates.push(ProviderCandidate::video(
            "D",
            1,
            CapabilityTable::new(8.0).with_native_audio(true),
        ));
        candidates.push(ProviderCandidate::image("img", 0));
        let router = FallbackRouter::new(candidates);

        let ids = |opts: &RouteOptions| -> Vec<String> {
            router
                .ordered(Capability::Video, opts)
                .into_iter()
                .map(|c| c.id.clone())
                .collect()
        };

        assert_eq!(ids(&RouteOptions::new()), vec!["A", "B", "D", "C"]);
        assert_eq!(ids(&RouteOptions::new().prefer("C")), vec!["C", "A", "B", "D"]);
        assert_eq!(ids(&RouteOptions::new().exclude("A")), vec!["B", "D", "C"]);
        assert_eq!(ids(&RouteOptions::new().with_native_audio()), vec!["D"]);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let router = FallbackRouter::new(chain());
        let err = router
            .route(
                &ScriptedMediaGenerator::new(),
                Capability::Image,
                &GenerationSpec::new("x"),
                &RouteOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::NoCandidates { .. }));
    }
}
