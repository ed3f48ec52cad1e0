//! Domain models for the refund desk.
//!
//! `RefundRequest` maps to the `refund_requests` table and is also the JSON
//! shape returned by every refund endpoint. Request bodies and query strings
//! live further down, next to the status enum they all share.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::error::RefundError;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "refund_status", rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Approved => "approved",
            RefundStatus::Rejected => "rejected",
            RefundStatus::Completed => "completed",
        }
    }

    /// Rejected and completed refunds accept no further changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefundStatus::Rejected | RefundStatus::Completed)
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefundStatus {
    type Err = RefundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(RefundStatus::Pending),
            "approved" => Ok(RefundStatus::Approved),
            "rejected" => Ok(RefundStatus::Rejected),
            "completed" => Ok(RefundStatus::Completed),
            other => Err(RefundError::Validation(format!(
                "invalid status '{}': expected one of pending, approved, rejected, completed",
                other
            ))),
        }
    }
}

// ============================================================================
// Database Models (sqlx::FromRow)
// ============================================================================

/// One refund attempt against a sale.
///
/// `approved_by` / `approved_at` hold the *last decision* on the refund: the
/// approver while it is approved or completed, the rejecting actor once it is
/// rejected. The audit trail is the authoritative history of who decided what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub id: Uuid,
    pub order_id: String,
    pub order_number: String,
    pub customer_name: String,
    #[serde(with = "money")]
    pub original_amount: BigDecimal,
    #[serde(with = "money")]
    pub refund_amount: BigDecimal,
    pub payment_method: String,
    pub reason: String,
    pub authorized_by: String,
    pub additional_notes: Option<String>,
    pub status: RefundStatus,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub refund_method: Option<String>,
    pub transaction_id: Option<String>,
}

// ============================================================================
// Request Models (Deserialize from JSON input)
// ============================================================================

/// Request body for `POST /refunds`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRefundRequest {
    pub order_id: String,
    pub order_number: String,
    pub customer_name: String,
    #[serde(with = "money")]
    pub original_amount: BigDecimal,
    #[serde(with = "money")]
    pub refund_amount: BigDecimal,
    pub payment_method: String,
    pub reason: String,
    pub authorized_by: String,
    pub requested_by: String,
    pub additional_notes: Option<String>,
    pub transaction_id: Option<String>,
}

/// Request body for `PUT /refunds/{id}`.
///
/// `status` stays a string here so an unknown or client-forbidden value
/// surfaces as a validation error rather than an extractor rejection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRefundRequest {
    pub status: String,
    pub approved_by: Option<String>,
    pub notes: Option<String>,
    pub refund_method: Option<String>,
    pub transaction_id: Option<String>,
}

/// Query string for `GET /refunds`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRefundsQuery {
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// Money (de)serialization
// ============================================================================

/// Serde adapter for decimal amounts.
///
/// Accepts a JSON number or a numeric string. Numbers go through their
/// shortest decimal rendering so `50.01` stays exactly `50.01`. Output is
/// always a two-place decimal string, the way a NUMERIC(12,2) column reads
/// back, whichever store produced the value.
pub mod money {
    use std::str::FromStr;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use sqlx::types::BigDecimal;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.with_scale(2).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        let text = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n.to_string(),
            Raw::Text(s) => s,
        };
        BigDecimal::from_str(text.trim())
            .map_err(|_| D::Error::custom(format!("invalid decimal amount '{}'", text)))
    }
}

/// Parse a decimal literal. Test and config helper.
pub fn decimal(text: &str) -> Result<BigDecimal, RefundError> {
    BigDecimal::from_str(text.trim())
        .map_err(|_| RefundError::Validation(format!("invalid decimal amount '{}'", text)))
}
