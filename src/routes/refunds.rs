//! Refund request routes.
//!
//! POST /refunds             - Create a refund request (policy decides the initial status)
//! GET  /refunds             - List refunds, newest first (?orderId=&status=&limit=&offset=)
//! GET  /refunds/{id}        - Retrieve one refund
//! PUT  /refunds/{id}        - Approve, reject or complete a refund
//! GET  /refunds/{id}/audit  - Audit trail for one refund, oldest first

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::audit::AuditLogEntry;
use crate::error::Result;
use crate::models::{CreateRefundRequest, ListRefundsQuery, RefundRequest, UpdateRefundRequest};
use crate::service::RefundService;

/// Shared handle to the refund service, injected as an Axum extension.
pub type SharedRefundService = Arc<RefundService>;

/// Build the refunds router.
pub fn router() -> Router {
    Router::new()
        .route("/refunds", get(list_refunds).post(create_refund))
        .route("/refunds/{id}", get(get_refund).put(update_refund))
        .route("/refunds/{id}/audit", get(get_audit_trail))
}

async fn create_refund(
    Extension(service): Extension<SharedRefundService>,
    Json(req): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<RefundRequest>)> {
    let refund = service.create(req).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

async fn list_refunds(
    Extension(service): Extension<SharedRefundService>,
    Query(query): Query<ListRefundsQuery>,
) -> Result<Json<Vec<RefundRequest>>> {
    Ok(Json(service.list(query).await?))
}

async fn get_refund(
    Extension(service): Extension<SharedRefundService>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundRequest>> {
    Ok(Json(service.get(id).await?))
}

/// Apply a status change. Resubmitting the current status returns the
/// unchanged refund with 200.
async fn update_refund(
    Extension(service): Extension<SharedRefundService>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRefundRequest>,
) -> Result<Json<RefundRequest>> {
    Ok(Json(service.update(id, req).await?))
}

async fn get_audit_trail(
    Extension(service): Extension<SharedRefundService>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    Ok(Json(service.audit_trail(id).await?))
}
