//! Refund error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the refund core.
pub type Result<T> = std::result::Result<T, RefundError>;

#[derive(Error, Debug)]
pub enum RefundError {
    /// Malformed or out-of-range input. Always caller-fixable.
    #[error("{0}")]
    Validation(String),

    #[error("refund {0} not found")]
    NotFound(Uuid),

    /// Well-formed request asking for a state change the lifecycle forbids.
    #[error("{0}")]
    InvalidTransition(String),

    /// Refunds disabled or payment method not allowed at creation time.
    #[error("{0}")]
    PolicyRejection(String),

    /// Connection loss or any other database failure inside the transaction.
    /// Nothing was committed, so the caller may retry.
    #[error("refund store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    /// Row lock not acquired within the configured lock timeout.
    #[error("timed out waiting for the lock on refund {0}")]
    LockTimeout(Uuid),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RefundError {
    pub fn code(&self) -> &'static str {
        match self {
            RefundError::Validation(_) => "VALIDATION_ERROR",
            RefundError::NotFound(_) => "NOT_FOUND",
            RefundError::InvalidTransition(_) => "INVALID_TRANSITION",
            RefundError::PolicyRejection(_) => "POLICY_REJECTION",
            RefundError::Store(_) | RefundError::LockTimeout(_) => "TRANSIENT_STORE_ERROR",
            RefundError::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RefundError::Validation(_)
            | RefundError::InvalidTransition(_)
            | RefundError::PolicyRejection(_) => StatusCode::BAD_REQUEST,
            RefundError::NotFound(_) => StatusCode::NOT_FOUND,
            RefundError::Store(_) | RefundError::LockTimeout(_) | RefundError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RefundError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let message = match &self {
            RefundError::Store(_) | RefundError::LockTimeout(_) => {
                "Refund store operation failed; safe to retry".to_string()
            }
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, code = code, "Refund request failed");
        } else {
            tracing::warn!(error = %self, code = code, "Refund request rejected");
        }

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
