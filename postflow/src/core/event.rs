//! Run lifecycle events delivered to the observer interface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::PipelineState;

/// An event emitted while a run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// The event type (e.g., "run.started", "stage.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl RunEvent {
    /// Creates a new event for a run.
    #[must_use]
    pub fn new(event_type: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: HashMap::new(),
        }
        .add_data("run_id", serde_json::json!(run_id.to_string()))
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Payload as a JSON object, as handed to event sinks.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut map: serde_json::Map<String, serde_json::Value> =
            self.data.clone().into_iter().collect();
        map.insert("timestamp".to_string(), serde_json::json!(self.timestamp));
        serde_json::Value::Object(map)
    }

    /// Creates a "run.state_changed" event.
    #[must_use]
    pub fn state_changed(run_id: Uuid, from: PipelineState, to: PipelineState) -> Self {
        Self::new("run.state_changed", run_id)
            .add_data("from", serde_json::json!(from.to_string()))
            .add_data("to", serde_json::json!(to.to_string()))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn stage_completed(run_id: Uuid, stage: &str, attempt: u32) -> Self {
        Self::new("stage.completed", run_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("attempt", serde_json::json!(attempt))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(run_id: Uuid, stage: &str, error: &str, kind: &str) -> Self {
        Self::new("stage.failed", run_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("error", serde_json::json!(error))
            .add_data("error_kind", serde_json::json!(kind))
    }
}
