//! Result record appended to a run's stage context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub name: String,
    /// Stage-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Whether the stage succeeded.
    pub success: bool,
    /// Error message if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 1-based attempt number for this stage name within the run.
    ///
    /// Assigned by the stage context on append.
    #[serde(default)]
    pub attempt: u32,
    /// When the result was produced.
    pub recorded_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            success: true,
            error: None,
            attempt: 0,
            recorded_at: Utc::now(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: serde_json::Value::Null,
            success: false,
            error: Some(error.into()),
            attempt: 0,
            recorded_at: Utc::now(),
        }
    }

    /// Attaches a payload (failed results may still carry diagnostics).
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Reads a string field from an object payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }

    /// Reads a numeric field from an object payload.
    #[must_use]
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(serde_json::Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_result_success() {
        let result = StageResult::success("plan_topic", serde_json::json!({"topic": "tide pools"}));

        assert_eq!(result.name, "plan_topic");
        assert!(result.is_success());
        assert!(result.error.is_none());
        assert_eq!(result.payload_str("topic"), Some("tide pools"));
    }

    #[test]
    fn test_stage_result_failure() {
        let result = StageResult::failure("publish", "rate limited");

        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("rate limited"));
        assert!(result.payload.is_null());
    }

    #[test]
    fn test_payload_accessors_on_non_object() {
        let result = StageResult::success("x", serde_json::json!("just text"));
        assert!(result.payload_str("topic").is_none());
        assert!(result.payload_f64("duration").is_none());
    }

    #[test]
    fn test_stage_result_serialization() {
        let result = StageResult::success("create_visual", serde_json::json!({"duration": 8.0}));

        let json = serde_json::to_string(&result).unwrap();
        let deserialized: StageResult = serde_json::from_str(&json).unwrap();

        assert_eq!(result.name, deserialized.name);
        assert_eq!(deserialized.payload_f64("duration"), Some(8.0));
    }
}
