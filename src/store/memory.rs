//! In-process refund store.
//!
//! Stands in for Postgres in tests and local runs. Each refund has its own
//! `tokio::sync::Mutex`, held across validate, mutate and audit, which gives
//! the same per-id serialization the database row lock does. Unrelated
//! refunds never contend.
//!
//! Committed rows live in the shared map next to their lock. Reads clone the
//! committed copy and never wait on a refund's lock, the way a plain SELECT
//! does not wait on FOR UPDATE.
//!
//! Transitions take the refund lock, then the audit log, then the map for
//! writing. Creation takes the audit log, then the map. The map lock is never
//! held while awaiting a refund lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditLogEntry, NewAuditEntry};
use crate::error::{RefundError, Result};
use crate::models::RefundRequest;
use crate::policy::RefundPolicy;
use crate::transition::{self, TransitionPlan, TransitionRequest};

use super::{RefundFilter, RefundStore};

#[derive(Default)]
struct AuditLog {
    entries: Vec<AuditLogEntry>,
    next_id: i64,
}

impl AuditLog {
    fn append(&mut self, entry: NewAuditEntry) {
        self.next_id += 1;
        self.entries
            .push(AuditLogEntry::from_new(self.next_id, entry, Utc::now()));
    }
}

struct Slot {
    lock: Arc<Mutex<()>>,
    committed: RefundRequest,
}

pub struct InMemoryRefundStore {
    rows: RwLock<HashMap<Uuid, Slot>>,
    audit: Mutex<AuditLog>,
    lock_timeout: Duration,
}

impl InMemoryRefundStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            audit: Mutex::new(AuditLog::default()),
            lock_timeout,
        }
    }

    async fn row_lock(&self, id: Uuid) -> Option<Arc<Mutex<()>>> {
        self.rows.read().await.get(&id).map(|slot| Arc::clone(&slot.lock))
    }
}

impl Default for InMemoryRefundStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl RefundStore for InMemoryRefundStore {
    async fn create(
        &self,
        refund: &RefundRequest,
        audit_entries: &[NewAuditEntry],
    ) -> Result<RefundRequest> {
        let mut audit = self.audit.lock().await;
        let mut rows = self.rows.write().await;

        if rows.contains_key(&refund.id) {
            return Err(RefundError::Validation(format!(
                "refund {} already exists",
                refund.id
            )));
        }

        rows.insert(
            refund.id,
            Slot {
                lock: Arc::new(Mutex::new(())),
                committed: refund.clone(),
            },
        );
        for entry in audit_entries {
            audit.append(entry.clone());
        }

        Ok(refund.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RefundRequest>> {
        Ok(self.rows.read().await.get(&id).map(|slot| slot.committed.clone()))
    }

    async fn list(&self, filter: &RefundFilter) -> Result<Vec<RefundRequest>> {
        let mut refunds: Vec<RefundRequest> = self
            .rows
            .read()
            .await
            .values()
            .map(|slot| &slot.committed)
            .filter(|refund| {
                filter
                    .order_id
                    .as_deref()
                    .map_or(true, |order_id| refund.order_id == order_id)
            })
            .filter(|refund| filter.status.map_or(true, |status| refund.status == status))
            .cloned()
            .collect();

        refunds.sort_by(|a, b| b.requested_at.cmp(&a.requested_at).then(a.id.cmp(&b.id)));

        Ok(refunds
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        request: &TransitionRequest,
        policy: &RefundPolicy,
    ) -> Result<RefundRequest> {
        let lock = self.row_lock(id).await.ok_or(RefundError::NotFound(id))?;

        let _guard = tokio::time::timeout(self.lock_timeout, lock.lock())
            .await
            .map_err(|_| RefundError::LockTimeout(id))?;

        let current = self
            .get(id)
            .await?
            .ok_or(RefundError::NotFound(id))?;

        match transition::plan(&current, request, policy, Utc::now())? {
            TransitionPlan::NoOp => {
                debug!(
                    refund_id = %id,
                    status = %current.status,
                    "Transition is a resubmission, nothing written"
                );
                Ok(current)
            }
            TransitionPlan::Apply { updated, audit } => {
                let actor = audit.actor.clone();

                let mut log = self.audit.lock().await;
                let mut rows = self.rows.write().await;
                let slot = rows.get_mut(&id).ok_or(RefundError::NotFound(id))?;
                slot.committed = updated.clone();
                log.append(audit);
                drop(rows);
                drop(log);

                info!(
                    refund_id = %id,
                    from = %current.status,
                    to = %updated.status,
                    actor = actor.as_deref().unwrap_or("system"),
                    "Refund transitioned"
                );
                Ok(updated)
            }
        }
    }

    async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLogEntry>> {
        let log = self.audit.lock().await;
        Ok(log
            .entries
            .iter()
            .filter(|entry| entry.refund_id == id)
            .cloned()
            .collect())
    }
}
