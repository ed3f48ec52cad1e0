//! # Refund Desk
//!
//! Refund-request lifecycle for a point-of-sale back office: policy-driven
//! initial decisions, a strict approve/reject/complete state machine,
//! row-locked transitions and an append-only audit trail.
//!
//! Exposes the Axum router and modules so integration tests can create an
//! in-process server without requiring `cargo run` in another terminal.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod policy;
pub mod routes;
pub mod service;
pub mod settings;
pub mod store;
pub mod transition;

use std::sync::Arc;

use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::RefundService;

/// Build the Axum router with all route modules and middleware.
///
/// The caller wires the service to a store and a settings provider; this
/// function does NOT connect to a database or start a server.
pub fn create_app(service: Arc<RefundService>) -> Router {
    Router::new()
        .merge(routes::refunds::router())
        .merge(routes::health::router())
        .layer(Extension(service))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
