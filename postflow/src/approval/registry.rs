//! Routes external responses to the gate of the run they belong to.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApprovalGate, ApprovalRequest, ApprovalResponse};

/// Concurrent map of live runs to their approval gates.
///
/// The state machine registers a gate when a run starts and removes it when
/// the run ends; the chat front-end resolves through here.
#[derive(Debug, Default)]
pub struct ApprovalRegistry {
    gates: DashMap<Uuid, Arc<ApprovalGate>>,
}

impl ApprovalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the gate for `run_id`.
    pub fn register(&self, run_id: Uuid, gate: Arc<ApprovalGate>) {
        self.gates.insert(run_id, gate);
    }

    /// Removes the gate for `run_id`.
    pub fn remove(&self, run_id: Uuid) -> Option<Arc<ApprovalGate>> {
        self.gates.remove(&run_id).map(|(_, gate)| gate)
    }

    /// Looks up the gate for `run_id`.
    #[must_use]
    pub fn get(&self, run_id: Uuid) -> Option<Arc<ApprovalGate>> {
        self.gates.get(&run_id).map(|entry| entry.value().clone())
    }

    /// Delivers `response` to the run's gate. Unknown runs are a no-op.
    pub fn resolve(&self, run_id: Uuid, response: ApprovalResponse) -> bool {
        self.get(run_id).is_some_and(|gate| gate.resolve(response))
    }

    /// Every outstanding request, keyed by run.
    #[must_use]
    pub fn pending(&self) -> Vec<(Uuid, ApprovalRequest)> {
        self.gates
            .iter()
            .filter_map(|entry| entry.value().pending_request().map(|r| (*entry.key(), r)))
            .collect()
    }

    /// Number of registered runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    /// Returns true if no run is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}
