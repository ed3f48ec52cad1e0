//! Environment-driven configuration.
//!
//! Values come from the process environment, with `.env` loaded by `main`
//! through dotenvy. The `REFUND_*` policy variables only seed the fallback
//! policy used when the settings table has no `refunds` entry.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use crate::db;
use crate::error::{RefundError, Result};
use crate::models::decimal;
use crate::policy::RefundPolicy;

/// Which refund store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = RefundError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "in-memory" => Ok(StoreKind::Memory),
            other => Err(RefundError::Config(format!(
                "REFUND_STORE must be 'postgres' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub lock_timeout: Duration,
    pub store: StoreKind,
    pub default_policy: RefundPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = RefundPolicy::default();
        let default_policy = RefundPolicy {
            enabled: parse_or(get("REFUND_ENABLED"), "REFUND_ENABLED", defaults.enabled)?,
            require_approval: parse_or(
                get("REFUND_REQUIRE_APPROVAL"),
                "REFUND_REQUIRE_APPROVAL",
                defaults.require_approval,
            )?,
            approval_threshold: match get("REFUND_APPROVAL_THRESHOLD") {
                Some(v) => decimal(&v).map_err(|_| invalid("REFUND_APPROVAL_THRESHOLD", &v))?,
                None => defaults.approval_threshold,
            },
            auto_approve_small_amounts: parse_or(
                get("REFUND_AUTO_APPROVE_SMALL"),
                "REFUND_AUTO_APPROVE_SMALL",
                defaults.auto_approve_small_amounts,
            )?,
            small_amount_threshold: match get("REFUND_SMALL_AMOUNT_THRESHOLD") {
                Some(v) => decimal(&v).map_err(|_| invalid("REFUND_SMALL_AMOUNT_THRESHOLD", &v))?,
                None => defaults.small_amount_threshold,
            },
            max_manager_refund: match get("REFUND_MAX_MANAGER_REFUND") {
                Some(v) => decimal(&v).map_err(|_| invalid("REFUND_MAX_MANAGER_REFUND", &v))?,
                None => defaults.max_manager_refund,
            },
            allowed_payment_methods: match get("REFUND_ALLOWED_PAYMENT_METHODS") {
                Some(v) => parse_methods(&v),
                None => defaults.allowed_payment_methods,
            },
        };

        // Postgres reads a lock_timeout of 0 as "wait forever", the in-memory
        // store as "never wait", so neither meaning is accepted.
        let lock_timeout_ms: u64 =
            parse_or(get("REFUND_LOCK_TIMEOUT_MS"), "REFUND_LOCK_TIMEOUT_MS", 5_000)?;
        if lock_timeout_ms == 0 {
            return Err(invalid("REFUND_LOCK_TIMEOUT_MS", "0"));
        }

        Ok(Self {
            database_url: get("APP_DATABASE_URL")
                .unwrap_or_else(|| db::DEFAULT_DATABASE_URL.to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10)?,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            store: match get("REFUND_STORE") {
                Some(v) => v.parse()?,
                None => StoreKind::Postgres,
            },
            default_policy,
        })
    }
}

fn invalid(key: &str, value: &str) -> RefundError {
    RefundError::Config(format!("invalid value for {}: '{}'", key, value))
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v.trim().parse().map_err(|_| invalid(key, &v)),
        None => Ok(default),
    }
}

fn parse_methods(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}
