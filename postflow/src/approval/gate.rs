//! Single-waiter approval gate.

use chrono::Utc;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{ActionTag, ApprovalRequest, ApprovalResponse};
use crate::errors::GateBusy;

/// Default time a human has to answer.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration =
    Duration::from_secs(crate::config::DEFAULT_APPROVAL_TIMEOUT_SECS);

/// The request currently waiting, with its response channel.
#[derive(Debug)]
struct PendingApproval {
    request: ApprovalRequest,
    response_tx: oneshot::Sender<ApprovalResponse>,
}

/// Suspends one run until an external decision arrives.
///
/// A gate holds at most one outstanding request. A second
/// [`wait_for_decision`](Self::wait_for_decision) while one is pending is
/// refused with [`GateBusy`].
#[derive(Debug, Default)]
pub struct ApprovalGate {
    pending: Mutex<Option<PendingApproval>>,
    history: Mutex<Vec<ApprovalRequest>>,
}

impl ApprovalGate {
    /// Creates a new gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a request and waits for [`resolve`](Self::resolve) or the timeout.
    ///
    /// On timeout the request is withdrawn and a `timeout` response returned.
    pub async fn wait_for_decision(
        &self,
        stage: &str,
        prompt: serde_json::Value,
        allowed_actions: &[ActionTag],
        timeout: Duration,
    ) -> Result<ApprovalResponse, GateBusy> {
        let now = Utc::now();
        let deadline = now
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(365));
        let request = ApprovalRequest {
            id: crate::utils::generate_uuid(),
            stage: stage.to_string(),
            prompt,
            allowed_actions: allowed_actions.to_vec(),
            created_at: now,
            deadline,
            resolved: None,
        };
        let request_id = request.id;

        let rx = {
            let mut pending = self.pending.lock();
            if let Some(existing) = pending.as_ref() {
                return Err(GateBusy {
                    request_id: existing.request.id.to_string(),
                });
            }
            let (tx, rx) = oneshot::channel();
            *pending = Some(PendingApproval {
                request,
                response_tx: tx,
            });
            rx
        };
        debug!(stage, %request_id, "Approval requested");

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                // Sender dropped without answering
                warn!(stage, %request_id, "Approval channel closed, treating as cancel");
                self.withdraw(request_id, ActionTag::Cancel);
                ApprovalResponse::cancel()
            }
            Err(_) => {
                info!(stage, %request_id, timeout_secs = timeout.as_secs_f64(), "Approval timed out");
                self.withdraw(request_id, ActionTag::Timeout);
                ApprovalResponse::timeout()
            }
        };

        Ok(response)
    }

    /// Delivers a decision to the waiting request.
    ///
    /// Returns `false` (and changes nothing) when no request is pending or
    /// the action is not one the request allows. Also returns `false` when
    /// the waiter stopped listening first; the request is then recorded as
    /// timed out.
    pub fn resolve(&self, response: ApprovalResponse) -> bool {
        let tag = response.action.tag();
        let mut pending = self.pending.lock();

        let allowed = match pending.as_ref() {
            None => {
                debug!(action = %tag, "Resolve with no pending request ignored");
                return false;
            }
            Some(p) => p.request.allows(tag),
        };
        if !allowed {
            warn!(action = %tag, "Action not allowed for pending request");
            return false;
        }

        let Some(PendingApproval {
            mut request,
            response_tx,
        }) = pending.take()
        else {
            return false;
        };
        drop(pending);

        // The waiter may have timed out after the entry was taken
        let delivered = response_tx.send(response).is_ok();
        if !delivered {
            info!(action = %tag, request_id = %request.id, "Waiter gone before the decision arrived");
        }
        request.resolved = Some(if delivered { tag } else { ActionTag::Timeout });
        self.history.lock().push(request);
        delivered
    }

    /// The outstanding request, if any.
    #[must_use]
    pub fn pending_request(&self) -> Option<ApprovalRequest> {
        self.pending.lock().as_ref().map(|p| p.request.clone())
    }

    /// Returns true if a request is outstanding.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Requests that have been answered or withdrawn, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ApprovalRequest> {
        self.history.lock().clone()
    }

    fn withdraw(&self, request_id: uuid::Uuid, outcome: ActionTag) {
        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|p| p.request.id == request_id) {
            if let Some(mut p) = pending.take() {
                p.request.resolved = Some(outcome);
                self.history.lock().push(p.request);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalAction;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_resolve_unblocks_waiter() {
        let gate = Arc::new(ApprovalGate::new());
        let waiter = gate.clone();

        let handle = tokio::spawn(async move {
            waiter
                .wait_for_decision(
                    "topic_approval",
                    serde_json::json!({"topic": "tide pools"}),
                    &ActionTag::REVIEW,
                    Duration::from_secs(5),
                )
                .await
        });

        while !gate.has_pending() {
            tokio::task::yield_now().await;
        }
        assert!(gate.resolve(ApprovalResponse::approve()));

        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.action, ApprovalAction::Approve);
        assert!(!gate.has_pending());
        assert_eq!(gate.history()[0].resolved, Some(ActionTag::Approve));
    }

    #[tokio::test]
    async fn test_wait_stays_pending_until_resolved() {
        let gate = ApprovalGate::new();
        let mut task = tokio_test::task::spawn(gate.wait_for_decision(
            "final_approval",
            serde_json::Value::Null,
            &ActionTag::REVIEW,
            Duration::from_secs(60),
        ));

        assert_pending!(task.poll());
        assert!(gate.resolve(ApprovalResponse::edit("punchier hook")));
        assert!(task.is_woken());

        let response = assert_ready!(task.poll()).unwrap();
        assert_eq!(response.action.tag(), ActionTag::Edit);
    }

    #[test]
    fn test_resolve_without_waiter_is_noop() {
        let gate = ApprovalGate::new();
        assert!(!gate.resolve(ApprovalResponse::approve()));
        assert!(gate.history().is_empty());
    }

    #[tokio::test]
    async fn test_one_resolve_unblocks_at_most_one_waiter() {
        let gate = ApprovalGate::new();
        let mut task = tokio_test::task::spawn(gate.wait_for_decision(
            "visual_approval",
            serde_json::Value::Null,
            &ActionTag::REVIEW,
            Duration::from_secs(60),
        ));
        assert_pending!(task.poll());

        assert!(gate.resolve(ApprovalResponse::approve()));
        assert!(!gate.resolve(ApprovalResponse::cancel()));

        let response = assert_ready!(task.poll()).unwrap();
        assert_eq!(response.action, ApprovalAction::Approve);
    }

    #[tokio::test]
    async fn test_disallowed_action_keeps_request_pending() {
        let gate = ApprovalGate::new();
        let mut task = tokio_test::task::spawn(gate.wait_for_decision(
            "create_visual",
            serde_json::Value::Null,
            &ActionTag::FAILURE,
            Duration::from_secs(60),
        ));
        assert_pending!(task.poll());

        assert!(!gate.resolve(ApprovalResponse::approve()));
        assert!(gate.has_pending());
        assert!(gate.resolve(ApprovalResponse::cancel()));
        assert_ready!(task.poll()).unwrap();
    }

    #[tokio::test]
    async fn test_second_wait_is_refused() {
        let gate = ApprovalGate::new();
        let mut first = tokio_test::task::spawn(gate.wait_for_decision(
            "topic_approval",
            serde_json::Value::Null,
            &ActionTag::REVIEW,
            Duration::from_secs(60),
        ));
        assert_pending!(first.poll());

        let second = gate
            .wait_for_decision(
                "topic_approval",
                serde_json::Value::Null,
                &ActionTag::REVIEW,
                Duration::from_secs(60),
            )
            .await;
        assert!(second.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_timeout_action() {
        let gate = ApprovalGate::new();

        let response = gate
            .wait_for_decision(
                "final_approval",
                serde_json::Value::Null,
                &ActionTag::REVIEW,
                DEFAULT_APPROVAL_TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(response.action, ApprovalAction::Timeout);
        assert!(!gate.has_pending());
        assert_eq!(gate.history()[0].resolved, Some(ActionTag::Timeout));
        assert!(!gate.resolve(ApprovalResponse::approve()));
    }

    #[tokio::test]
    async fn test_late_decision_for_gone_waiter_is_recorded_as_timeout() {
        let gate = ApprovalGate::new();
        let mut task = tokio_test::task::spawn(gate.wait_for_decision(
            "final_approval",
            serde_json::Value::Null,
            &ActionTag::REVIEW,
            Duration::from_secs(60),
        ));
        assert_pending!(task.poll());
        drop(task);

        assert!(!gate.resolve(ApprovalResponse::approve()));
        assert!(!gate.has_pending());
        let history = gate.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].resolved, Some(ActionTag::Timeout));
    }
}
