//! Refund lifecycle state machine.
//!
//! ```text
//! pending  -> approved | rejected
//! approved -> rejected | completed
//! rejected, completed: terminal
//! ```
//!
//! Asking for the status a refund already has is a no-op, so client retries
//! are harmless. [`plan`] is pure: the stores call it while holding the row
//! lock and persist whatever it returns.

use chrono::{DateTime, Utc};

use crate::audit::{
    ApprovedPayload, AuditPayload, CompletedPayload, NewAuditEntry, RejectedPayload,
};
use crate::error::{RefundError, Result};
use crate::models::{RefundRequest, RefundStatus};
use crate::policy::RefundPolicy;

/// A requested status change with its actor and payment details.
///
/// Blank strings are treated as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub status: RefundStatus,
    pub approved_by: Option<String>,
    pub notes: Option<String>,
    pub refund_method: Option<String>,
    pub transaction_id: Option<String>,
}

impl TransitionRequest {
    pub fn new(status: RefundStatus) -> Self {
        Self {
            status,
            approved_by: None,
            notes: None,
            refund_method: None,
            transaction_id: None,
        }
    }

    pub fn approved_by(mut self, actor: impl Into<String>) -> Self {
        self.approved_by = Some(actor.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn refund_method(mut self, method: impl Into<String>) -> Self {
        self.refund_method = Some(method.into());
        self
    }

    pub fn transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }
}

/// Outcome of validating a transition against the locked row.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionPlan {
    /// Resubmission of the current status. Nothing to write.
    NoOp,
    Apply {
        updated: RefundRequest,
        audit: NewAuditEntry,
    },
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn append_note(existing: Option<String>, note: Option<&str>) -> Option<String> {
    match (existing, note) {
        (Some(current), Some(note)) if !current.trim().is_empty() => {
            Some(format!("{}\n{}", current, note))
        }
        (_, Some(note)) => Some(note.to_string()),
        (current, None) => current,
    }
}

fn illegal(from: RefundStatus, to: RefundStatus) -> RefundError {
    RefundError::InvalidTransition(format!(
        "cannot transition refund from {} to {}",
        from, to
    ))
}

/// Validate `request` against `current` and compute the resulting row and
/// audit entry.
pub fn plan(
    current: &RefundRequest,
    request: &TransitionRequest,
    policy: &RefundPolicy,
    now: DateTime<Utc>,
) -> Result<TransitionPlan> {
    let from = current.status;
    let to = request.status;

    if from == to {
        return Ok(TransitionPlan::NoOp);
    }

    let notes = present(&request.notes);
    let mut updated = current.clone();
    updated.status = to;
    updated.additional_notes = append_note(current.additional_notes.clone(), notes);

    let (actor, message, payload) = match (from, to) {
        (RefundStatus::Pending, RefundStatus::Approved) => {
            let actor = present(&request.approved_by).ok_or_else(|| {
                RefundError::InvalidTransition("approvedBy is required".to_string())
            })?;

            updated.approved_by = Some(actor.to_string());
            updated.approved_at = Some(now);

            (
                actor,
                format!("Refund approved by {}", actor),
                AuditPayload::Approved(ApprovedPayload {
                    from,
                    to,
                    approved_by: actor.to_string(),
                    auto_approved_by: None,
                    notes: notes.map(String::from),
                }),
            )
        }
        (RefundStatus::Pending | RefundStatus::Approved, RefundStatus::Rejected) => {
            let actor = present(&request.approved_by).ok_or_else(|| {
                RefundError::InvalidTransition("approvedBy is required".to_string())
            })?;

            // The row keeps only the last decision; the audit entry keeps the
            // approver being overwritten.
            let previous_approved_by = match from {
                RefundStatus::Approved => current.approved_by.clone(),
                _ => None,
            };
            updated.approved_by = Some(actor.to_string());
            updated.approved_at = Some(now);

            (
                actor,
                format!("Refund rejected by {}", actor),
                AuditPayload::Rejected(RejectedPayload {
                    from,
                    to,
                    rejected_by: actor.to_string(),
                    previous_approved_by,
                    notes: notes.map(String::from),
                }),
            )
        }
        (RefundStatus::Approved, RefundStatus::Completed) => {
            let method = present(&request.refund_method).ok_or_else(|| {
                RefundError::InvalidTransition("refundMethod is required".to_string())
            })?;

            if !policy.allows_payment_method(method) {
                return Err(RefundError::InvalidTransition(format!(
                    "refundMethod '{}' is not an allowed payment method",
                    method
                )));
            }

            let transaction_id = present(&request.transaction_id)
                .or_else(|| present(&current.transaction_id))
                .map(String::from);

            if !method.eq_ignore_ascii_case("cash") && transaction_id.is_none() {
                return Err(RefundError::InvalidTransition(
                    "transactionId is required for non-cash refunds".to_string(),
                ));
            }

            updated.completed_at = Some(now);
            updated.refund_method = Some(method.to_string());
            updated.transaction_id = transaction_id.clone();

            let actor = present(&request.approved_by)
                .or_else(|| present(&current.approved_by))
                .unwrap_or(current.requested_by.as_str());

            (
                actor,
                format!("Refund of {} completed via {}", current.refund_amount, method),
                AuditPayload::Completed(CompletedPayload {
                    from,
                    to,
                    refund_method: method.to_string(),
                    transaction_id,
                    refund_amount: current.refund_amount.clone(),
                    notes: notes.map(String::from),
                }),
            )
        }
        _ => return Err(illegal(from, to)),
    };

    let audit = NewAuditEntry {
        refund_id: current.id,
        actor: Some(actor.to_string()),
        message,
        payload,
    };

    Ok(TransitionPlan::Apply { updated, audit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::models::decimal;
    use uuid::Uuid;

    fn refund(status: RefundStatus) -> RefundRequest {
        let requested_at = Utc::now();
        let approved = matches!(status, RefundStatus::Approved | RefundStatus::Completed);
        RefundRequest {
            id: Uuid::new_v4(),
            order_id: "ord-77".into(),
            order_number: "1077".into(),
            customer_name: "Sam Ortiz".into(),
            original_amount: decimal("80.00").unwrap(),
            refund_amount: decimal("30.00").unwrap(),
            payment_method: "card".into(),
            reason: "wrong order".into(),
            authorized_by: "Shift Lead".into(),
            additional_notes: None,
            status,
            requested_by: "cashier-1".into(),
            requested_at,
            approved_by: approved.then(|| "Shift Lead".to_string()),
            approved_at: approved.then_some(requested_at),
            completed_at: None,
            refund_method: None,
            transaction_id: None,
        }
    }

    fn apply(
        current: &RefundRequest,
        request: TransitionRequest,
    ) -> Result<(RefundRequest, NewAuditEntry)> {
        match plan(current, &request, &RefundPolicy::default(), Utc::now())? {
            TransitionPlan::Apply { updated, audit } => Ok((updated, audit)),
            TransitionPlan::NoOp => panic!("expected a state change"),
        }
    }

    #[test]
    fn test_same_status_is_noop_for_every_status() {
        for status in [
            RefundStatus::Pending,
            RefundStatus::Approved,
            RefundStatus::Rejected,
            RefundStatus::Completed,
        ] {
            let row = refund(status);
            let request = TransitionRequest::new(status);
            let outcome = plan(&row, &request, &RefundPolicy::default(), Utc::now());
            assert_eq!(outcome.unwrap(), TransitionPlan::NoOp);
        }
    }

    #[test]
    fn test_approve_requires_actor() {
        let request = TransitionRequest::new(RefundStatus::Approved);
        let err = apply(&refund(RefundStatus::Pending), request).unwrap_err();
        assert!(matches!(
            err,
            RefundError::InvalidTransition(ref m) if m == "approvedBy is required"
        ));

        let blank = TransitionRequest::new(RefundStatus::Approved).approved_by("   ");
        assert!(apply(&refund(RefundStatus::Pending), blank).is_err());
    }

    #[test]
    fn test_approve_sets_decision_fields() {
        let row = refund(RefundStatus::Pending);
        let (updated, audit) = apply(
            &row,
            TransitionRequest::new(RefundStatus::Approved)
                .approved_by("Floor Manager")
                .notes("customer is a regular"),
        )
        .unwrap();

        assert_eq!(updated.status, RefundStatus::Approved);
        assert_eq!(updated.approved_by.as_deref(), Some("Floor Manager"));
        assert!(updated.approved_at.is_some());
        assert_eq!(updated.additional_notes.as_deref(), Some("customer is a regular"));
        assert_eq!(updated.refund_amount, row.refund_amount);
        assert_eq!(audit.action(), AuditAction::Approved);
        assert_eq!(audit.actor.as_deref(), Some("Floor Manager"));
    }

    #[test]
    fn test_reject_from_pending() {
        let (updated, audit) = apply(
            &refund(RefundStatus::Pending),
            TransitionRequest::new(RefundStatus::Rejected).approved_by("Floor Manager"),
        )
        .unwrap();
        assert_eq!(updated.status, RefundStatus::Rejected);
        match audit.payload {
            AuditPayload::Rejected(p) => assert!(p.previous_approved_by.is_none()),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_reject_from_approved_keeps_previous_approver_in_audit() {
        let (updated, audit) = apply(
            &refund(RefundStatus::Approved),
            TransitionRequest::new(RefundStatus::Rejected).approved_by("General Manager"),
        )
        .unwrap();

        assert_eq!(updated.approved_by.as_deref(), Some("General Manager"));
        match audit.payload {
            AuditPayload::Rejected(p) => {
                assert_eq!(p.from, RefundStatus::Approved);
                assert_eq!(p.previous_approved_by.as_deref(), Some("Shift Lead"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_reject_requires_actor() {
        let request = TransitionRequest::new(RefundStatus::Rejected);
        let err = apply(&refund(RefundStatus::Approved), request).unwrap_err();
        assert_eq!(err.to_string(), "approvedBy is required");
    }

    #[test]
    fn test_pending_cannot_skip_to_completed() {
        let err = apply(
            &refund(RefundStatus::Pending),
            TransitionRequest::new(RefundStatus::Completed).refund_method("cash"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RefundError::InvalidTransition(ref m) if m.contains("pending to completed")
        ));
    }

    #[test]
    fn test_terminal_states_reject_changes() {
        let cases = [
            (RefundStatus::Rejected, RefundStatus::Approved),
            (RefundStatus::Rejected, RefundStatus::Completed),
            (RefundStatus::Completed, RefundStatus::Rejected),
            (RefundStatus::Completed, RefundStatus::Approved),
            (RefundStatus::Approved, RefundStatus::Pending),
        ];
        for (from, to) in cases {
            let request = TransitionRequest::new(to)
                .approved_by("Floor Manager")
                .refund_method("cash");
            let err = apply(&refund(from), request).unwrap_err();
            assert!(matches!(err, RefundError::InvalidTransition(_)), "{} -> {}", from, to);
        }
    }

    #[test]
    fn test_complete_cash_without_transaction_id() {
        let (updated, audit) = apply(
            &refund(RefundStatus::Approved),
            TransitionRequest::new(RefundStatus::Completed).refund_method("cash"),
        )
        .unwrap();
        assert_eq!(updated.status, RefundStatus::Completed);
        assert_eq!(updated.refund_method.as_deref(), Some("cash"));
        assert!(updated.completed_at.is_some());
        assert!(updated.transaction_id.is_none());
        assert_eq!(audit.action(), AuditAction::Completed);
    }

    #[test]
    fn test_complete_card_requires_transaction_id() {
        let err = apply(
            &refund(RefundStatus::Approved),
            TransitionRequest::new(RefundStatus::Completed).refund_method("card"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "transactionId is required for non-cash refunds");
    }

    #[test]
    fn test_complete_card_falls_back_to_stored_transaction_id() {
        let mut row = refund(RefundStatus::Approved);
        row.transaction_id = Some("txn_stored".into());
        let (updated, _) = apply(
            &row,
            TransitionRequest::new(RefundStatus::Completed).refund_method("card"),
        )
        .unwrap();
        assert_eq!(updated.transaction_id.as_deref(), Some("txn_stored"));
    }

    #[test]
    fn test_complete_explicit_transaction_id_wins() {
        let mut row = refund(RefundStatus::Approved);
        row.transaction_id = Some("txn_stored".into());
        let (updated, _) = apply(
            &row,
            TransitionRequest::new(RefundStatus::Completed)
                .refund_method("card")
                .transaction_id("txn_new"),
        )
        .unwrap();
        assert_eq!(updated.transaction_id.as_deref(), Some("txn_new"));
    }

    #[test]
    fn test_complete_requires_allowed_method() {
        let err = apply(
            &refund(RefundStatus::Approved),
            TransitionRequest::new(RefundStatus::Completed).transaction_id("txn_1"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "refundMethod is required");

        let err = apply(
            &refund(RefundStatus::Approved),
            TransitionRequest::new(RefundStatus::Completed)
                .refund_method("store_credit")
                .transaction_id("txn_1"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("store_credit"));
    }

    #[test]
    fn test_notes_are_appended() {
        let mut row = refund(RefundStatus::Pending);
        row.additional_notes = Some("Auto-approved (Small Amount)".into());
        let (updated, _) = apply(
            &row,
            TransitionRequest::new(RefundStatus::Rejected)
                .approved_by("Floor Manager")
                .notes("duplicate request"),
        )
        .unwrap();
        assert_eq!(
            updated.additional_notes.as_deref(),
            Some("Auto-approved (Small Amount)\nduplicate request")
        );
    }
}
