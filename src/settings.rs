//! Read-only access to the refund policy.
//!
//! The policy lives in the back office's generic `settings` key/value table
//! under the `refunds` key. It is fetched on every request so a change made by
//! an administrator applies to the next refund without a restart.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use crate::error::Result;
use crate::policy::RefundPolicy;

pub const REFUND_SETTINGS_KEY: &str = "refunds";

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn refund_policy(&self) -> Result<RefundPolicy>;
}

/// A fixed policy, typically built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    policy: RefundPolicy,
}

impl StaticSettings {
    pub fn new(policy: RefundPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn refund_policy(&self) -> Result<RefundPolicy> {
        Ok(self.policy.clone())
    }
}

/// Reads the policy from Postgres, falling back to `default_policy` when the
/// key has never been written.
pub struct PgSettingsProvider {
    pool: PgPool,
    default_policy: RefundPolicy,
}

impl PgSettingsProvider {
    pub fn new(pool: PgPool, default_policy: RefundPolicy) -> Self {
        Self {
            pool,
            default_policy,
        }
    }
}

#[async_trait]
impl SettingsProvider for PgSettingsProvider {
    async fn refund_policy(&self) -> Result<RefundPolicy> {
        let stored: Option<Json<RefundPolicy>> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
                .bind(REFUND_SETTINGS_KEY)
                .fetch_optional(&self.pool)
                .await?;

        match stored {
            Some(Json(policy)) => Ok(policy),
            None => {
                debug!(key = REFUND_SETTINGS_KEY, "No stored refund settings, using defaults");
                Ok(self.default_policy.clone())
            }
        }
    }
}
