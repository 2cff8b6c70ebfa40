//! Time-of-day trigger for recipes.
//!
//! The scheduler only decides *when* a recipe starts; everything else is
//! the state machine's job. Entries fire once per day when the wall clock
//! crosses their time.

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::RecipeKind;
use crate::pipeline::{PipelineStateMachine, RunInput, RunOutcome};

/// How often the scheduler looks at the clock by default.
pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// Starts recipe runs.
#[async_trait]
pub trait RecipeTrigger: Send + Sync {
    /// Runs `recipe` to completion.
    async fn trigger(&self, recipe: RecipeKind, input: RunInput) -> RunOutcome;
}

#[async_trait]
impl RecipeTrigger for PipelineStateMachine {
    async fn trigger(&self, recipe: RecipeKind, input: RunInput) -> RunOutcome {
        self.run(recipe, input).await
    }
}

/// One daily run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    /// Recipe to run.
    pub recipe: RecipeKind,
    /// Time of day (UTC).
    pub at: NaiveTime,
    /// Input handed to the run.
    pub input: RunInput,
}

impl ScheduleEntry {
    /// Creates an entry with an empty input.
    #[must_use]
    pub fn new(recipe: RecipeKind, at: NaiveTime) -> Self {
        Self {
            recipe,
            at,
            input: RunInput::new(),
        }
    }

    /// Sets the run input.
    #[must_use]
    pub fn with_input(mut self, input: RunInput) -> Self {
        self.input = input;
        self
    }

    /// Returns true if `at` lies in `(prev, now]`, wrapping past midnight.
    #[must_use]
    pub fn is_due(&self, prev: NaiveTime, now: NaiveTime) -> bool {
        if prev <= now {
            prev < self.at && self.at <= now
        } else {
            self.at > prev || self.at <= now
        }
    }
}

type Clock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// Fires [`ScheduleEntry`]s through a [`RecipeTrigger`].
pub struct Scheduler {
    trigger: Arc<dyn RecipeTrigger>,
    entries: Vec<ScheduleEntry>,
    tick: Duration,
    clock: Clock,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("entries", &self.entries)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates an empty schedule over `trigger`.
    #[must_use]
    pub fn new(trigger: Arc<dyn RecipeTrigger>) -> Self {
        Self {
            trigger,
            entries: Vec::new(),
            tick: DEFAULT_TICK,
            clock: Arc::new(|| Utc::now().time()),
        }
    }

    /// Adds an entry.
    #[must_use]
    pub fn with_entry(mut self, entry: ScheduleEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Sets the polling period.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Replaces the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Scheduled entries.
    #[must_use]
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Entries whose time falls in `(prev, now]`.
    #[must_use]
    pub fn due_between(&self, prev: NaiveTime, now: NaiveTime) -> Vec<&ScheduleEntry> {
        self.entries.iter().filter(|e| e.is_due(prev, now)).collect()
    }

    /// Ticks until `shutdown` turns true (or its sender goes away).
    ///
    /// Due runs are triggered one after another. Returns how many were
    /// started.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = tokio::time::interval(self.tick);
        let mut prev = (self.clock)();
        let mut started = 0;
        info!(entries = self.entries.len(), tick_secs = self.tick.as_secs_f64(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = (self.clock)();
                    for entry in self.due_between(prev, now) {
                        info!(recipe = %entry.recipe, at = %entry.at, "Triggering scheduled run");
                        let outcome = self.trigger.trigger(entry.recipe, entry.input.clone()).await;
                        started += 1;
                        if outcome.success {
                            info!(run_id = %outcome.run_id, "Scheduled run completed");
                        } else {
                            warn!(
                                run_id = %outcome.run_id,
                                final_state = %outcome.final_state,
                                error = ?outcome.error,
                                "Scheduled run did not complete"
                            );
                        }
                    }
                    debug!(%prev, %now, "Schedule checked");
                    prev = now;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(started, "Scheduler stopped");
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, TestHarness};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_due_window_is_half_open() {
        let entry = ScheduleEntry::new(RecipeKind::Autonomous, hm(9, 0));
        assert!(entry.is_due(hm(8, 59), hm(9, 0)));
        assert!(!entry.is_due(hm(9, 0), hm(9, 1)));
        assert!(!entry.is_due(hm(8, 0), hm(8, 59)));
    }

    #[test]
    fn test_due_window_wraps_midnight() {
        let late = ScheduleEntry::new(RecipeKind::Autonomous, hm(23, 59));
        let early = ScheduleEntry::new(RecipeKind::Autonomous, hm(0, 0));
        assert!(late.is_due(hm(23, 58), hm(0, 1)));
        assert!(early.is_due(hm(23, 58), hm(0, 1)));
        assert!(!ScheduleEntry::new(RecipeKind::Autonomous, hm(12, 0)).is_due(hm(23, 58), hm(0, 1)));
    }

    #[test]
    fn test_due_between_filters_entries() {
        let machine = Arc::new(TestHarness::new().machine(fast_config()));
        let scheduler = Scheduler::new(machine)
            .with_entry(ScheduleEntry::new(RecipeKind::Autonomous, hm(7, 0)))
            .with_entry(ScheduleEntry::new(RecipeKind::LongForm, hm(18, 30)));

        let due = scheduler.due_between(hm(18, 0), hm(19, 0));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].recipe, RecipeKind::LongForm);
    }

    struct RecordingTrigger {
        machine: PipelineStateMachine,
        recipes: Mutex<Vec<RecipeKind>>,
    }

    #[async_trait]
    impl RecipeTrigger for RecordingTrigger {
        async fn trigger(&self, recipe: RecipeKind, input: RunInput) -> RunOutcome {
            self.recipes.lock().push(recipe);
            self.machine.trigger(recipe, input).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_triggers_due_entries_until_shutdown() {
        let harness = TestHarness::new();
        let trigger = Arc::new(RecordingTrigger {
            machine: harness.machine(fast_config()),
            recipes: Mutex::new(Vec::new()),
        });

        let times = [hm(8, 59), hm(9, 1), hm(9, 3)];
        let calls = Arc::new(AtomicUsize::new(0));
        let clock_calls = calls.clone();
        let scheduler = Scheduler::new(trigger.clone())
            .with_tick(Duration::from_secs(60))
            .with_entry(ScheduleEntry::new(RecipeKind::Autonomous, hm(9, 0)))
            .with_clock(move || {
                let i = clock_calls.fetch_add(1, Ordering::SeqCst);
                times[i.min(times.len() - 1)]
            });

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(*trigger.recipes.lock(), vec![RecipeKind::Autonomous]);
        assert_eq!(harness.publisher.calls().len(), 1);
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }
}
