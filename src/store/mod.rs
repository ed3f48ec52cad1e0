//! Refund persistence boundary.
//!
//! Every mutation runs as one atomic unit: row write and audit append commit
//! together or not at all. `apply_transition` additionally holds an exclusive
//! lock on the target refund for the whole lock, validate, mutate, audit
//! sequence so transitions on one id are strictly serialized.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::{AuditLogEntry, NewAuditEntry};
use crate::error::Result;
use crate::models::{RefundRequest, RefundStatus};
use crate::policy::RefundPolicy;
use crate::transition::TransitionRequest;

pub use memory::InMemoryRefundStore;
pub use postgres::PgRefundStore;

pub const DEFAULT_LIST_LIMIT: i64 = 200;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Read-only listing filter. Built by the service with limits already clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundFilter {
    pub order_id: Option<String>,
    pub status: Option<RefundStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RefundFilter {
    fn default() -> Self {
        Self {
            order_id: None,
            status: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    /// Insert a new refund together with its initial audit entries.
    async fn create(&self, refund: &RefundRequest, audit: &[NewAuditEntry])
        -> Result<RefundRequest>;

    async fn get(&self, id: Uuid) -> Result<Option<RefundRequest>>;

    /// Newest first by `requested_at`.
    async fn list(&self, filter: &RefundFilter) -> Result<Vec<RefundRequest>>;

    /// Lock the refund, validate the change against its current state, then
    /// persist the new row and one audit entry. Resubmitting the current
    /// status returns the row untouched and writes nothing.
    async fn apply_transition(
        &self,
        id: Uuid,
        request: &TransitionRequest,
        policy: &RefundPolicy,
    ) -> Result<RefundRequest>;

    /// Oldest first.
    async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLogEntry>>;
}
