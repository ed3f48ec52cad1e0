//! Append-only audit trail for refund state changes.
//!
//! Every mutation of a refund produces exactly one entry, written in the same
//! transaction as the mutation itself. There is deliberately no update or
//! delete path: entries are inserted with [`record`] and read back with
//! [`entries_for`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::{BigDecimal, Json};
use sqlx::{FromRow, PgConnection, PgExecutor, Row};
use uuid::Uuid;

use crate::error::{RefundError, Result};
use crate::models::{money, RefundStatus};
use crate::policy::PolicyRule;

/// Audit action tag, mirrored in the `action` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Requested,
    Approved,
    Rejected,
    Completed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Requested => "requested",
            AuditAction::Approved => "approved",
            AuditAction::Rejected => "rejected",
            AuditAction::Completed => "completed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = RefundError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "requested" => Ok(AuditAction::Requested),
            "approved" => Ok(AuditAction::Approved),
            "rejected" => Ok(AuditAction::Rejected),
            "completed" => Ok(AuditAction::Completed),
            other => Err(RefundError::Validation(format!(
                "unknown audit action '{}'",
                other
            ))),
        }
    }
}

/// Structured snapshot stored as the entry's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AuditPayload {
    Requested(RequestedPayload),
    Approved(ApprovedPayload),
    Rejected(RejectedPayload),
    Completed(CompletedPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedPayload {
    pub from: Option<RefundStatus>,
    pub to: RefundStatus,
    #[serde(with = "money")]
    pub original_amount: BigDecimal,
    #[serde(with = "money")]
    pub refund_amount: BigDecimal,
    pub payment_method: String,
    pub authorized_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedPayload {
    pub from: RefundStatus,
    pub to: RefundStatus,
    pub approved_by: String,
    /// Set when the approval came from policy at creation time.
    pub auto_approved_by: Option<PolicyRule>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedPayload {
    pub from: RefundStatus,
    pub to: RefundStatus,
    pub rejected_by: String,
    /// Approver overwritten on the row when an approved refund is rejected.
    pub previous_approved_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPayload {
    pub from: RefundStatus,
    pub to: RefundStatus,
    pub refund_method: String,
    pub transaction_id: Option<String>,
    #[serde(with = "money")]
    pub refund_amount: BigDecimal,
    pub notes: Option<String>,
}

impl AuditPayload {
    pub fn action(&self) -> AuditAction {
        match self {
            AuditPayload::Requested(_) => AuditAction::Requested,
            AuditPayload::Approved(_) => AuditAction::Approved,
            AuditPayload::Rejected(_) => AuditAction::Rejected,
            AuditPayload::Completed(_) => AuditAction::Completed,
        }
    }
}

/// An entry about to be appended. The action is derived from the payload so
/// the two can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub refund_id: Uuid,
    pub actor: Option<String>,
    pub message: String,
    pub payload: AuditPayload,
}

impl NewAuditEntry {
    pub fn action(&self) -> AuditAction {
        self.payload.action()
    }
}

/// A persisted audit entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub refund_id: Uuid,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub message: String,
    pub metadata: AuditPayload,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn from_new(id: i64, entry: NewAuditEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            refund_id: entry.refund_id,
            action: entry.action(),
            actor: entry.actor,
            message: entry.message,
            metadata: entry.payload,
            created_at,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for AuditLogEntry {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        let action: String = row.try_get("action")?;
        let action = action
            .parse::<AuditAction>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "action".to_string(),
                source: Box::new(e),
            })?;
        let Json(metadata): Json<AuditPayload> = row.try_get("metadata")?;

        Ok(Self {
            id: row.try_get("id")?,
            refund_id: row.try_get("refund_id")?,
            action,
            actor: row.try_get("actor")?,
            message: row.try_get("message")?,
            metadata,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Append one entry. Takes a connection rather than a pool so callers pass
/// the transaction that carries the mutation being described.
pub async fn record(conn: &mut PgConnection, entry: &NewAuditEntry) -> Result<AuditLogEntry> {
    let recorded: AuditLogEntry = sqlx::query_as(
        r#"
        INSERT INTO refund_audit_log (refund_id, action, actor, message, metadata)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(entry.refund_id)
    .bind(entry.action().as_str())
    .bind(&entry.actor)
    .bind(&entry.message)
    .bind(Json(&entry.payload))
    .fetch_one(conn)
    .await?;

    Ok(recorded)
}

/// Full trail for one refund, oldest first.
pub async fn entries_for<'e>(
    executor: impl PgExecutor<'e>,
    refund_id: Uuid,
) -> Result<Vec<AuditLogEntry>> {
    let entries = sqlx::query_as(
        "SELECT * FROM refund_audit_log WHERE refund_id = $1 ORDER BY created_at, id",
    )
    .bind(refund_id)
    .fetch_all(executor)
    .await?;

    Ok(entries)
}
