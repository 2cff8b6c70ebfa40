//! The pipeline state machine.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::handlers::{StageHandlers, StageOutput};
use super::ledger::PublishLedger;
use super::outcome::{RunFailure, RunOutcome};
use super::run_context::{RunContext, RunInput};
use super::transitions::{StateEvent, TransitionTable};
use crate::approval::{ActionTag, ApprovalAction, ApprovalGate, ApprovalRegistry, ApprovalRequest, ApprovalResponse};
use crate::config::PipelineConfig;
use crate::context::Run;
use crate::core::{ArtifactRef, PipelineState, RecipeKind, RunEvent};
use crate::errors::{GateBusy, PostflowError};
use crate::events::{emit_run_event, EventSink, NoOpEventSink};
use crate::providers::{FallbackRouter, ProviderCandidate};
use crate::stages::ports::StagePorts;
use crate::stages::StageResult;

/// What one state produced.
#[derive(Debug)]
enum Step {
    /// Feed this event to the transition table.
    Event(StateEvent),
    /// The run cannot continue.
    Fail { stage: String, error: PostflowError },
}

/// Clears the active-run slot when the run ends.
struct ActiveRun<'a> {
    slot: &'a Mutex<Option<Uuid>>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Takes the run's gate out of the registry when the run ends, however it ends.
struct GateRegistration<'a> {
    registry: &'a ApprovalRegistry,
    run_id: Uuid,
}

impl Drop for GateRegistration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.run_id);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Drives runs through their recipe's transition table.
///
/// One instance executes at most one run at a time. Gated states park the
/// run on its [`ApprovalGate`], reachable through [`Self::resolve`] while
/// the run is suspended.
pub struct PipelineStateMachine {
    handlers: StageHandlers,
    candidates: Arc<[ProviderCandidate]>,
    config: PipelineConfig,
    events: Arc<dyn EventSink>,
    approvals: Arc<ApprovalRegistry>,
    ledger: PublishLedger,
    active: Mutex<Option<Uuid>>,
}

impl std::fmt::Debug for PipelineStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStateMachine")
            .field("candidates", &self.candidates.len())
            .field("active", &*self.active.lock())
            .field("published", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl PipelineStateMachine {
    /// Creates a machine over the given collaborators and candidate table.
    #[must_use]
    pub fn new(
        ports: StagePorts,
        candidates: impl Into<Arc<[ProviderCandidate]>>,
        config: PipelineConfig,
    ) -> Self {
        let candidates = candidates.into();
        let events: Arc<dyn EventSink> = Arc::new(NoOpEventSink);
        Self {
            handlers: Self::build_handlers(ports, candidates.clone(), &config, events.clone()),
            candidates,
            config,
            events,
            approvals: Arc::new(ApprovalRegistry::new()),
            ledger: PublishLedger::new(),
            active: Mutex::new(None),
        }
    }

    fn build_handlers(
        ports: StagePorts,
        candidates: Arc<[ProviderCandidate]>,
        config: &PipelineConfig,
        events: Arc<dyn EventSink>,
    ) -> StageHandlers {
        let router = FallbackRouter::new(candidates)
            .with_timeout(config.provider_timeout())
            .with_event_sink(events);
        StageHandlers::new(ports, router, config.clone())
    }

    /// Sends lifecycle events (and router fallbacks) to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.handlers = Self::build_handlers(
            self.handlers.ports().clone(),
            self.candidates.clone(),
            &self.config,
            sink.clone(),
        );
        self.events = sink;
        self
    }

    /// Registers gates in a registry shared with other machines.
    #[must_use]
    pub fn with_approval_registry(mut self, registry: Arc<ApprovalRegistry>) -> Self {
        self.approvals = registry;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registry of suspended runs.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalRegistry> {
        &self.approvals
    }

    /// Publications made by this instance.
    #[must_use]
    pub fn ledger(&self) -> &PublishLedger {
        &self.ledger
    }

    /// Id of the run in progress.
    #[must_use]
    pub fn active_run(&self) -> Option<Uuid> {
        *self.active.lock()
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Requests waiting for an answer.
    #[must_use]
    pub fn pending_approvals(&self) -> Vec<(Uuid, ApprovalRequest)> {
        self.approvals.pending()
    }

    /// Answers the pending request of `run_id`.
    ///
    /// Returns `false` when that run has nothing pending or the action is
    /// not allowed there.
    pub fn resolve(&self, run_id: Uuid, response: ApprovalResponse) -> bool {
        self.approvals.resolve(run_id, response)
    }

    fn claim(&self, run_id: Uuid) -> Result<ActiveRun<'_>, PostflowError> {
        let mut slot = self.active.lock();
        if let Some(active) = *slot {
            return Err(PostflowError::AlreadyRunning {
                active_run: active.to_string(),
            });
        }
        *slot = Some(run_id);
        Ok(ActiveRun { slot: &self.active })
    }

    /// Executes `recipe` to a terminal state.
    ///
    /// Never returns an error: failures, cancellations and a rejected start
    /// (another run in progress) are all reported in the [`RunOutcome`].
    pub async fn run(&self, recipe: RecipeKind, input: RunInput) -> RunOutcome {
        let mut run = Run::new(recipe);
        let run_id = run.id();

        let _active = match self.claim(run_id) {
            Ok(guard) => guard,
            Err(err) => {
                warn!(%run_id, %recipe, error = %err, "Run rejected");
                if let Err(e) = run.finish(PipelineState::Idle) {
                    error!(%run_id, error = %e, "Could not close rejected run");
                }
                return RunOutcome::from_run(&run, Some(RunFailure::new(&err, None)));
            }
        };

        let span = info_span!("pipeline_run", %run_id, %recipe);
        self.drive(run, input).instrument(span).await
    }

    async fn drive(&self, mut run: Run, input: RunInput) -> RunOutcome {
        let run_id = run.id();
        let recipe = run.recipe();
        let table = TransitionTable::for_recipe(recipe);
        let gate = Arc::new(ApprovalGate::new());
        self.approvals.register(run_id, gate.clone());
        let registration = GateRegistration {
            registry: &self.approvals,
            run_id,
        };
        let mut ctx = RunContext::new(run_id, recipe, input, &self.config);

        info!(platforms = ?ctx.platforms, target_duration = ctx.target_duration, "Run started");
        self.emit(RunEvent::new("run.started", run_id).add_data("recipe", serde_json::json!(recipe.to_string())))
            .await;

        let mut state = table.initial();
        let mut failure: Option<RunFailure> = None;
        self.enter(&mut run, state).await;

        while !state.is_terminal() {
            let step = if state.is_gate() {
                self.review_gate(&mut run, &mut ctx, &gate, &table, state).await
            } else {
                self.work(&mut run, &mut ctx, &gate, state).await
            };

            let event = match step {
                Step::Event(event) => event,
                Step::Fail { stage, error } => {
                    failure = Some(RunFailure::new(&error, Some(&stage)));
                    if matches!(error, PostflowError::QualityRejected { .. }) {
                        StateEvent::QualityRejected
                    } else {
                        StateEvent::StageFailed
                    }
                }
            };

            if event == StateEvent::Timeout {
                let timeout = PostflowError::ApprovalTimeout {
                    stage: state.stage_name().to_string(),
                    timeout_seconds: self.config.approval_timeout().as_secs_f64(),
                };
                failure = Some(RunFailure::new(&timeout, Some(state.stage_name())));
            }

            let next = match table.next(state, event) {
                Some(next) => next,
                None => {
                    if failure.is_none() {
                        let err = PostflowError::unrecoverable(format!(
                            "no transition from {state} on {event}"
                        ));
                        error!(%state, %event, "Illegal transition");
                        failure = Some(RunFailure::new(&err, Some(state.stage_name())));
                    }
                    PipelineState::Error
                }
            };
            self.enter(&mut run, next).await;
            state = next;
        }

        drop(registration);
        self.conclude(run, failure).await
    }

    async fn enter(&self, run: &mut Run, next: PipelineState) {
        let result = if next.is_terminal() {
            let previous = run.state();
            run.finish(next).map(|()| previous)
        } else {
            run.transition(next)
        };
        match result {
            Ok(previous) => {
                debug!(from = %previous, to = %next, "State changed");
                self.emit(RunEvent::state_changed(run.id(), previous, next)).await;
            }
            Err(e) => error!(to = %next, error = %e, "State change rejected"),
        }
    }

    async fn work(
        &self,
        run: &mut Run,
        ctx: &mut RunContext,
        gate: &ApprovalGate,
        state: PipelineState,
    ) -> Step {
        let stage = state.stage_name();
        let started = Instant::now();

        let executed = AssertUnwindSafe(self.handlers.execute(state, ctx, &self.ledger))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(stage, panic = %message, "Stage handler panicked");
                Err(PostflowError::unrecoverable(format!("{stage} handler panicked: {message}")))
            });

        match executed {
            Ok(output) => {
                let attempt = self.record(run, StageResult::success(stage, output.payload()));
                info!(
                    stage,
                    attempt,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Stage completed"
                );
                if let StageOutput::Visual(visual) = &output {
                    for warning in visual.warnings() {
                        warn!(stage, warning, "Narration adjusted with content loss");
                    }
                }
                self.emit(RunEvent::stage_completed(run.id(), stage, attempt)).await;
                ctx.apply(&output);
                Step::Event(StateEvent::StageSucceeded)
            }
            Err(error) => {
                let result = StageResult::failure(stage, error.to_string()).with_payload(serde_json::json!({
                    "kind": error.kind(),
                    "recoverable": error.is_recoverable(),
                }));
                let attempt = self.record(run, result);
                warn!(stage, attempt, kind = error.kind(), error = %error, "Stage failed");
                self.emit(RunEvent::stage_failed(run.id(), stage, &error.to_string(), error.kind()))
                    .await;

                if run.recipe().has_gates() && error.is_recoverable() {
                    return self.failure_gate(run, ctx, gate, state, &error).await;
                }
                Step::Fail {
                    stage: stage.to_string(),
                    error,
                }
            }
        }
    }

    /// Lets a human retry, switch provider or cancel after a recoverable failure.
    async fn failure_gate(
        &self,
        run: &mut Run,
        ctx: &mut RunContext,
        gate: &ApprovalGate,
        state: PipelineState,
        error: &PostflowError,
    ) -> Step {
        let stage = state.stage_name();
        let message = format!("{stage} failed: {error}. Retry, switch provider or cancel?");
        let prompt = serde_json::json!({
            "run_id": run.id().to_string(),
            "stage": stage,
            "error": error.to_dict(),
        });

        match self
            .ask(run.id(), gate, stage, &message, prompt, None, &ActionTag::FAILURE)
            .await
        {
            Ok(response) => self.decide(run, ctx, stage, response, false),
            Err(busy) => Step::Fail {
                stage: stage.to_string(),
                error: busy.into(),
            },
        }
    }

    async fn review_gate(
        &self,
        run: &mut Run,
        ctx: &mut RunContext,
        gate: &ApprovalGate,
        table: &TransitionTable,
        state: PipelineState,
    ) -> Step {
        let stage = state.stage_name();
        let (message, prompt) = self.gate_prompt(run, ctx, state);
        let artifact = match state {
            PipelineState::AwaitingVisualApproval | PipelineState::AwaitingFinalApproval => ctx.visual.clone(),
            _ => None,
        };

        match self
            .ask(run.id(), gate, stage, &message, prompt, artifact.as_ref(), table.allowed_actions(state))
            .await
        {
            Ok(response) => self.decide(run, ctx, stage, response, true),
            Err(busy) => Step::Fail {
                stage: stage.to_string(),
                error: busy.into(),
            },
        }
    }

    /// Reviewer message and request payload for a gate.
    ///
    /// The payload carries the latest successful output of the state the
    /// gate reviews; the final gate adds caption, artifact and platforms.
    fn gate_prompt(&self, run: &Run, ctx: &RunContext, state: PipelineState) -> (String, serde_json::Value) {
        let producing = state.producing_state().map_or("", |p| p.stage_name());
        let output = run
            .context()
            .latest_success(producing)
            .map_or(serde_json::Value::Null, |r| r.payload.clone());
        let mut prompt = serde_json::json!({
            "run_id": ctx.run_id.to_string(),
            "stage": producing,
            "output": output.clone(),
        });

        let message = match state {
            PipelineState::AwaitingTopicApproval => {
                format!("Proposed topic: {}", ctx.topic.as_deref().unwrap_or("?"))
            }
            PipelineState::AwaitingContentApproval => {
                format!("Draft caption:\n{}", ctx.caption().unwrap_or_default())
            }
            PipelineState::AwaitingVisualApproval => {
                let warnings: Vec<&str> = output
                    .get("sync")
                    .and_then(serde_json::Value::as_array)
                    .map(|decisions| {
                        decisions
                            .iter()
                            .filter_map(|d| d.get("warning").and_then(serde_json::Value::as_str))
                            .collect()
                    })
                    .unwrap_or_default();
                if warnings.is_empty() {
                    "Visual ready for review".to_string()
                } else {
                    format!("Visual ready for review. Warnings: {}", warnings.join("; "))
                }
            }
            PipelineState::AwaitingFinalApproval => {
                prompt["caption"] = serde_json::json!(ctx.caption());
                prompt["artifact"] = ctx.visual.as_ref().map_or(serde_json::Value::Null, ArtifactRef::to_value);
                prompt["platforms"] = serde_json::json!(ctx.platforms);
                prompt["quality"] = serde_json::to_value(&ctx.quality).unwrap_or(serde_json::Value::Null);
                match &ctx.quality {
                    Some(score) if score.aggregate >= self.config.quality.threshold => format!(
                        "Ready to publish to {}. Quality {:.1}/10.",
                        ctx.platforms.join(", "),
                        score.aggregate
                    ),
                    Some(score) => format!(
                        "Quality {:.1}/10 is below {:.1}. {} Publish to {} anyway?",
                        score.aggregate,
                        self.config.quality.threshold,
                        score.feedback(),
                        ctx.platforms.join(", ")
                    ),
                    None => format!("Ready to publish to {}.", ctx.platforms.join(", ")),
                }
            }
            other => format!("Review {}", other.stage_name()),
        };
        (message, prompt)
    }

    #[allow(clippy::too_many_arguments)]
    async fn ask(
        &self,
        run_id: Uuid,
        gate: &ApprovalGate,
        stage: &str,
        message: &str,
        prompt: serde_json::Value,
        artifact: Option<&ArtifactRef>,
        allowed: &[ActionTag],
    ) -> Result<ApprovalResponse, GateBusy> {
        self.notify(message, artifact, allowed).await;
        self.emit(
            RunEvent::new("approval.requested", run_id)
                .add_data("stage", serde_json::json!(stage))
                .add_data("allowed_actions", serde_json::json!(allowed)),
        )
        .await;
        info!(stage, "Waiting for approval");

        let response = gate
            .wait_for_decision(stage, prompt, allowed, self.config.approval_timeout())
            .await?;

        let action = response.action.tag();
        info!(stage, %action, responder = ?response.responder, "Approval resolved");
        self.emit(
            RunEvent::new("approval.resolved", run_id)
                .add_data("stage", serde_json::json!(stage))
                .add_data("action", serde_json::json!(action.to_string())),
        )
        .await;
        Ok(response)
    }

    /// Applies a reviewer's answer to the run context.
    fn decide(
        &self,
        run: &mut Run,
        ctx: &mut RunContext,
        stage: &str,
        response: ApprovalResponse,
        record: bool,
    ) -> Step {
        let action = response.action.tag();
        if record {
            let payload = serde_json::to_value(&response).unwrap_or(serde_json::Value::Null);
            let result = if action == ActionTag::Approve {
                StageResult::success(stage, payload)
            } else {
                StageResult::failure(stage, format!("reviewer answered {action}")).with_payload(payload)
            };
            self.record(run, result);
        }

        match &response.action {
            ApprovalAction::Edit { instructions } => ctx.set_instructions(instructions.clone()),
            ApprovalAction::ChangeProvider { provider } => ctx.switch_provider(provider.clone()),
            _ => {}
        }
        Step::Event(StateEvent::from(&response.action))
    }

    fn record(&self, run: &mut Run, result: StageResult) -> u32 {
        match run.record(result) {
            Ok(recorded) => recorded.attempt,
            Err(e) => {
                error!(error = %e, "Stage result dropped");
                0
            }
        }
    }

    async fn conclude(&self, run: Run, failure: Option<RunFailure>) -> RunOutcome {
        let run_id = run.id();
        let outcome = RunOutcome::from_run(&run, failure);

        match outcome.final_state {
            PipelineState::Completed => {
                info!(
                    stages = outcome.stages_completed.len(),
                    elapsed_secs = outcome.snapshot.elapsed_secs(),
                    "Run completed"
                );
                self.emit(
                    RunEvent::new("run.completed", run_id)
                        .add_data("stages_completed", serde_json::json!(outcome.stages_completed)),
                )
                .await;
                self.notify("Post published", None, &[]).await;
            }
            PipelineState::Idle => {
                let reason = if outcome.error.is_some() { "timeout" } else { "cancel" };
                info!(reason, "Run cancelled");
                self.emit(RunEvent::new("run.cancelled", run_id).add_data("reason", serde_json::json!(reason)))
                    .await;
            }
            _ => {
                let failure = outcome.error.clone();
                error!(
                    stage = failure.as_ref().and_then(|f| f.stage.as_deref()),
                    kind = failure.as_ref().map(|f| f.kind.as_str()),
                    error = failure.as_ref().map(|f| f.message.as_str()),
                    "Run failed"
                );
                self.emit(
                    RunEvent::new("run.failed", run_id)
                        .add_data("error", serde_json::to_value(&failure).unwrap_or(serde_json::Value::Null))
                        .add_data("stages_completed", serde_json::json!(outcome.stages_completed)),
                )
                .await;
                let message = match &failure {
                    Some(f) => format!(
                        "Run failed at {}: {}",
                        f.stage.as_deref().unwrap_or("unknown stage"),
                        f.message
                    ),
                    None => "Run failed".to_string(),
                };
                self.notify(&message, None, &[]).await;
            }
        }
        outcome
    }

    async fn emit(&self, event: RunEvent) {
        emit_run_event(self.events.as_ref(), &event).await;
    }

    async fn notify(&self, message: &str, artifact: Option<&ArtifactRef>, options: &[ActionTag]) {
        if let Err(e) = self.handlers.ports().notifier.notify(message, artifact, options).await {
            warn!(error = %e, "Notifier failed");
        }
    }
}
