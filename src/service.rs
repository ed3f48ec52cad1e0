//! Refund service: the operations the HTTP boundary calls.
//!
//! Validates input, consults the policy fetched for this request, and hands
//! persistence to the [`RefundStore`]. Holds no state of its own beyond the
//! two collaborators, so any number of instances can serve the same database.

use std::sync::Arc;

use chrono::Utc;
use sqlx::types::BigDecimal;
use tracing::info;
use uuid::Uuid;

use crate::audit::{
    ApprovedPayload, AuditLogEntry, AuditPayload, NewAuditEntry, RequestedPayload,
};
use crate::error::{RefundError, Result};
use crate::models::{
    CreateRefundRequest, ListRefundsQuery, RefundRequest, RefundStatus, UpdateRefundRequest,
};
use crate::policy::{self, PolicyDecision, PolicyInput};
use crate::settings::SettingsProvider;
use crate::store::{RefundFilter, RefundStore, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::transition::TransitionRequest;

/// Amounts are stored as NUMERIC(12,2): at most 2 decimal places and 10
/// integer digits.
const MAX_AMOUNT_SCALE: i64 = 2;
const AMOUNT_LIMIT: i64 = 10_000_000_000;

const TARGET_STATUS_HINT: &str = "status must be one of approved, rejected, completed";

pub struct RefundService {
    store: Arc<dyn RefundStore>,
    settings: Arc<dyn SettingsProvider>,
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RefundError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn validate_amount(field: &str, amount: &BigDecimal) -> Result<()> {
    if *amount <= BigDecimal::from(0) {
        return Err(RefundError::Validation(format!(
            "{} must be greater than zero",
            field
        )));
    }
    if *amount >= BigDecimal::from(AMOUNT_LIMIT) {
        return Err(RefundError::Validation(format!(
            "{} must be less than {}",
            field, AMOUNT_LIMIT
        )));
    }
    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    if scale > MAX_AMOUNT_SCALE {
        return Err(RefundError::Validation(format!(
            "{} must have at most {} decimal places",
            field, MAX_AMOUNT_SCALE
        )));
    }
    Ok(())
}

fn with_annotation(notes: Option<String>, annotation: &str) -> String {
    match notes {
        Some(notes) => format!("{}\n{}", notes, annotation),
        None => annotation.to_string(),
    }
}

/// Parse the client-facing status of a PUT body. `pending` is never a valid
/// target for a client.
pub fn parse_target_status(raw: &str) -> Result<RefundStatus> {
    match raw.parse::<RefundStatus>()? {
        RefundStatus::Pending => Err(RefundError::Validation(TARGET_STATUS_HINT.to_string())),
        status => Ok(status),
    }
}

impl RefundService {
    pub fn new(store: Arc<dyn RefundStore>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self { store, settings }
    }

    /// Validate, decide the initial status, and persist the refund with its
    /// "requested" (and, when auto-approved, "approved") audit entries.
    pub async fn create(&self, input: CreateRefundRequest) -> Result<RefundRequest> {
        let order_id = required("orderId", &input.order_id)?;
        let order_number = required("orderNumber", &input.order_number)?;
        let customer_name = required("customerName", &input.customer_name)?;
        let payment_method = required("paymentMethod", &input.payment_method)?;
        let reason = required("reason", &input.reason)?;
        let authorized_by = required("authorizedBy", &input.authorized_by)?;
        let requested_by = required("requestedBy", &input.requested_by)?;

        validate_amount("originalAmount", &input.original_amount)?;
        validate_amount("refundAmount", &input.refund_amount)?;
        if input.refund_amount > input.original_amount {
            return Err(RefundError::Validation(
                "refundAmount cannot exceed originalAmount".to_string(),
            ));
        }

        let policy = self.settings.refund_policy().await?;
        let decision = policy::decide(
            &policy,
            &PolicyInput {
                refund_amount: &input.refund_amount,
                payment_method: &payment_method,
                authorized_by: &authorized_by,
            },
        )?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let notes = optional(input.additional_notes.as_deref());
        let auto_approved = decision.rule();

        let mut refund = RefundRequest {
            id,
            order_id,
            order_number,
            customer_name,
            original_amount: input.original_amount.clone(),
            refund_amount: input.refund_amount.clone(),
            payment_method,
            reason,
            authorized_by,
            additional_notes: match auto_approved {
                Some(rule) => Some(with_annotation(notes, rule.label())),
                None => notes,
            },
            status: decision.status(),
            requested_by,
            requested_at: now,
            approved_by: None,
            approved_at: None,
            completed_at: None,
            refund_method: None,
            transaction_id: optional(input.transaction_id.as_deref()),
        };

        let mut audit = vec![NewAuditEntry {
            refund_id: id,
            actor: Some(refund.requested_by.clone()),
            message: format!(
                "Refund of {} requested for order {}",
                refund.refund_amount, refund.order_number
            ),
            payload: AuditPayload::Requested(RequestedPayload {
                from: None,
                to: RefundStatus::Pending,
                original_amount: refund.original_amount.clone(),
                refund_amount: refund.refund_amount.clone(),
                payment_method: refund.payment_method.clone(),
                authorized_by: refund.authorized_by.clone(),
            }),
        }];

        if let PolicyDecision::AutoApproved(rule) = decision {
            refund.approved_by = Some(refund.authorized_by.clone());
            refund.approved_at = Some(now);
            audit.push(NewAuditEntry {
                refund_id: id,
                actor: None,
                message: rule.label().to_string(),
                payload: AuditPayload::Approved(ApprovedPayload {
                    from: RefundStatus::Pending,
                    to: RefundStatus::Approved,
                    approved_by: refund.authorized_by.clone(),
                    auto_approved_by: Some(rule),
                    notes: None,
                }),
            });
        }

        let created = self.store.create(&refund, &audit).await?;

        info!(
            refund_id = %created.id,
            order_id = %created.order_id,
            status = %created.status,
            amount = %created.refund_amount,
            "Refund request created"
        );
        Ok(created)
    }

    /// Move a refund to `request.status`. Resubmitting the current status
    /// returns the row unchanged.
    pub async fn transition(&self, id: Uuid, request: TransitionRequest) -> Result<RefundRequest> {
        if request.status == RefundStatus::Pending {
            return Err(RefundError::Validation(TARGET_STATUS_HINT.to_string()));
        }

        let policy = self.settings.refund_policy().await?;
        self.store.apply_transition(id, &request, &policy).await
    }

    /// Convenience for the HTTP layer: parse a PUT body into a transition.
    pub async fn update(&self, id: Uuid, body: UpdateRefundRequest) -> Result<RefundRequest> {
        let request = TransitionRequest {
            status: parse_target_status(&body.status)?,
            approved_by: optional(body.approved_by.as_deref()),
            notes: optional(body.notes.as_deref()),
            refund_method: optional(body.refund_method.as_deref()),
            transaction_id: optional(body.transaction_id.as_deref()),
        };
        self.transition(id, request).await
    }

    pub async fn list(&self, query: ListRefundsQuery) -> Result<Vec<RefundRequest>> {
        let status = match optional(query.status.as_deref()) {
            Some(raw) => Some(raw.parse::<RefundStatus>()?),
            None => None,
        };

        let filter = RefundFilter {
            order_id: optional(query.order_id.as_deref()),
            status,
            limit: query
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
            offset: query.offset.unwrap_or(0).max(0),
        };

        self.store.list(&filter).await
    }

    pub async fn get(&self, id: Uuid) -> Result<RefundRequest> {
        self.store
            .get(id)
            .await?
            .ok_or(RefundError::NotFound(id))
    }

    /// Audit trail for one refund, oldest first.
    pub async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLogEntry>> {
        // Distinguish "no such refund" from "refund with no entries".
        self.get(id).await?;
        self.store.audit_trail(id).await
    }
}
