//! Append-only store of stage results for one run.

use crate::stages::StageResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered log of every stage result produced by a run.
///
/// Entries are never replaced. A revision of a stage appends a new entry
/// with the next attempt number, so the full history stays readable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageContext {
    entries: Vec<StageResult>,
    #[serde(skip)]
    attempts: HashMap<String, u32>,
}

impl StageContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result, assigning its attempt number, and returns it.
    pub fn append(&mut self, mut result: StageResult) -> &StageResult {
        let attempt = self.attempts.entry(result.name.clone()).or_insert(0);
        *attempt += 1;
        result.attempt = *attempt;
        self.entries.push(result);
        &self.entries[self.entries.len() - 1]
    }

    /// The most recent result recorded under `name`.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<&StageResult> {
        self.entries.iter().rev().find(|r| r.name == name)
    }

    /// The most recent successful result recorded under `name`.
    #[must_use]
    pub fn latest_success(&self, name: &str) -> Option<&StageResult> {
        self.entries
            .iter()
            .rev()
            .find(|r| r.name == name && r.success)
    }

    /// Every result recorded under `name`, oldest first.
    #[must_use]
    pub fn history(&self, name: &str) -> Vec<&StageResult> {
        self.entries.iter().filter(|r| r.name == name).collect()
    }

    /// Number of attempts recorded under `name`.
    #[must_use]
    pub fn attempts(&self, name: &str) -> u32 {
        self.attempts.get(name).copied().unwrap_or(0)
    }

    /// All entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[StageResult] {
        &self.entries
    }

    /// Names of successful entries in the order they completed.
    #[must_use]
    pub fn completed_stages(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|r| r.success)
            .map(|r| r.name.clone())
            .collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_assigns_attempts_per_name() {
        let mut ctx = StageContext::new();
        ctx.append(StageResult::success("plan_topic", serde_json::json!({"topic": "a"})));
        ctx.append(StageResult::success("create_content", serde_json::json!({})));
        let revised = ctx
            .append(StageResult::success("plan_topic", serde_json::json!({"topic": "b"})))
            .attempt;

        assert_eq!(revised, 2);
        assert_eq!(ctx.attempts("plan_topic"), 2);
        assert_eq!(ctx.attempts("publish"), 0);
    }

    #[test]
    fn test_revision_keeps_history() {
        let mut ctx = StageContext::new();
        ctx.append(StageResult::success("plan_topic", serde_json::json!({"topic": "first"})));
        ctx.append(StageResult::success("plan_topic", serde_json::json!({"topic": "second"})));

        let history: Vec<_> = ctx
            .history("plan_topic")
            .iter()
            .filter_map(|r| r.payload_str("topic"))
            .collect();
        assert_eq!(history, vec!["first", "second"]);
        assert_eq!(ctx.latest("plan_topic").unwrap().payload_str("topic"), Some("second"));
    }

    #[test]
    fn test_latest_success_skips_failures() {
        let mut ctx = StageContext::new();
        ctx.append(StageResult::success("create_visual", serde_json::json!({"uri": "ok.png"})));
        ctx.append(StageResult::failure("create_visual", "all candidates failed"));

        assert!(!ctx.latest("create_visual").unwrap().success);
        assert_eq!(
            ctx.latest_success("create_visual").unwrap().payload_str("uri"),
            Some("ok.png")
        );
    }

    #[test]
    fn test_completed_stages_in_order() {
        let mut ctx = StageContext::new();
        ctx.append(StageResult::success("plan_topic", serde_json::Value::Null));
        ctx.append(StageResult::failure("create_content", "timeout"));
        ctx.append(StageResult::success("create_content", serde_json::Value::Null));

        assert_eq!(ctx.completed_stages(), vec!["plan_topic", "create_content"]);
        assert_eq!(ctx.len(), 3);
    }
}
