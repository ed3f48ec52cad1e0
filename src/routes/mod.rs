//! HTTP route modules for the refund desk.
//!
//! - `refunds`: refund request lifecycle (create, list, get, transition, audit trail)
//! - `health`: liveness probe

pub mod health;
pub mod refunds;
