//! Postgres-backed refund store.
//!
//! Serialization across server instances comes from `SELECT ... FOR UPDATE`
//! inside the transaction, not from anything held in process memory.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{self, AuditLogEntry, NewAuditEntry};
use crate::error::{RefundError, Result};
use crate::models::RefundRequest;
use crate::policy::RefundPolicy;
use crate::transition::{self, TransitionPlan, TransitionRequest};

use super::{RefundFilter, RefundStore};

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

pub struct PgRefundStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgRefundStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

fn lock_error(id: Uuid, err: sqlx::Error) -> RefundError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE) => {
            RefundError::LockTimeout(id)
        }
        _ => RefundError::Store(err),
    }
}

#[async_trait]
impl RefundStore for PgRefundStore {
    async fn create(
        &self,
        refund: &RefundRequest,
        audit_entries: &[NewAuditEntry],
    ) -> Result<RefundRequest> {
        // Dropping `tx` on an early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let created: RefundRequest = sqlx::query_as(
            r#"
            INSERT INTO refund_requests (
                id, order_id, order_number, customer_name, original_amount, refund_amount,
                payment_method, reason, authorized_by, additional_notes, status,
                requested_by, requested_at, approved_by, approved_at, completed_at,
                refund_method, transaction_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(refund.id)
        .bind(&refund.order_id)
        .bind(&refund.order_number)
        .bind(&refund.customer_name)
        .bind(&refund.original_amount)
        .bind(&refund.refund_amount)
        .bind(&refund.payment_method)
        .bind(&refund.reason)
        .bind(&refund.authorized_by)
        .bind(&refund.additional_notes)
        .bind(refund.status)
        .bind(&refund.requested_by)
        .bind(refund.requested_at)
        .bind(&refund.approved_by)
        .bind(refund.approved_at)
        .bind(refund.completed_at)
        .bind(&refund.refund_method)
        .bind(&refund.transaction_id)
        .fetch_one(&mut *tx)
        .await?;

        for entry in audit_entries {
            audit::record(&mut *tx, entry).await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<RefundRequest>> {
        let refund = sqlx::query_as("SELECT * FROM refund_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(refund)
    }

    async fn list(&self, filter: &RefundFilter) -> Result<Vec<RefundRequest>> {
        let refunds = sqlx::query_as(
            r#"
            SELECT * FROM refund_requests
            WHERE ($1::text IS NULL OR order_id = $1)
              AND ($2::refund_status IS NULL OR status = $2)
            ORDER BY requested_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&filter.order_id)
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(refunds)
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        request: &TransitionRequest,
        policy: &RefundPolicy,
    ) -> Result<RefundRequest> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        let current: Option<RefundRequest> =
            sqlx::query_as("SELECT * FROM refund_requests WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| lock_error(id, e))?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Err(RefundError::NotFound(id));
        };

        let (updated, entry) = match transition::plan(&current, request, policy, Utc::now()) {
            Ok(TransitionPlan::Apply { updated, audit }) => (updated, audit),
            Ok(TransitionPlan::NoOp) => {
                tx.commit().await?;
                debug!(
                    refund_id = %id,
                    status = %current.status,
                    "Transition is a resubmission, nothing written"
                );
                return Ok(current);
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        let stored: RefundRequest = sqlx::query_as(
            r#"
            UPDATE refund_requests
            SET status = $2,
                approved_by = $3,
                approved_at = $4,
                completed_at = $5,
                refund_method = $6,
                transaction_id = $7,
                additional_notes = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(updated.status)
        .bind(&updated.approved_by)
        .bind(updated.approved_at)
        .bind(updated.completed_at)
        .bind(&updated.refund_method)
        .bind(&updated.transaction_id)
        .bind(&updated.additional_notes)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(&mut *tx, &entry).await?;
        tx.commit().await?;

        info!(
            refund_id = %id,
            from = %current.status,
            to = %stored.status,
            actor = entry.actor.as_deref().unwrap_or("system"),
            "Refund transitioned"
        );
        Ok(stored)
    }

    async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLogEntry>> {
        audit::entries_for(&self.pool, id).await
    }
}
