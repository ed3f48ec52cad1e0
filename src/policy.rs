//! Refund policy: settings shape and the creation-time decision.
//!
//! [`decide`] is pure. It maps a proposed refund plus the current settings to
//! the status the refund starts in, or rejects the creation outright.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;

use crate::error::{RefundError, Result};
use crate::models::{money, RefundStatus};

/// Role label whose self-approval is capped by `max_manager_refund`.
pub const RESTAURANT_MANAGER: &str = "Restaurant Manager";

/// Refund settings as published by the settings provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefundPolicy {
    pub enabled: bool,
    pub require_approval: bool,
    #[serde(with = "money")]
    pub approval_threshold: BigDecimal,
    pub auto_approve_small_amounts: bool,
    #[serde(with = "money")]
    pub small_amount_threshold: BigDecimal,
    #[serde(with = "money")]
    pub max_manager_refund: BigDecimal,
    pub allowed_payment_methods: BTreeSet<String>,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            require_approval: true,
            approval_threshold: BigDecimal::from(100),
            auto_approve_small_amounts: true,
            small_amount_threshold: BigDecimal::from(25),
            max_manager_refund: BigDecimal::from(500),
            allowed_payment_methods: ["cash", "card"].into_iter().map(String::from).collect(),
        }
    }
}

impl RefundPolicy {
    pub fn allows_payment_method(&self, method: &str) -> bool {
        self.allowed_payment_methods.contains(method)
    }
}

/// Which rule produced an automatic approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    SmallAmount,
    BelowThreshold,
}

impl PolicyRule {
    /// Annotation appended to the refund's notes.
    pub fn label(&self) -> &'static str {
        match self {
            PolicyRule::SmallAmount => "Auto-approved (Small Amount)",
            PolicyRule::BelowThreshold => "Auto-approved (Below Threshold)",
        }
    }
}

/// What the policy needs to know about a proposed refund.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub refund_amount: &'a BigDecimal,
    pub payment_method: &'a str,
    pub authorized_by: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Pending,
    AutoApproved(PolicyRule),
}

impl PolicyDecision {
    pub fn status(&self) -> RefundStatus {
        match self {
            PolicyDecision::Pending => RefundStatus::Pending,
            PolicyDecision::AutoApproved(_) => RefundStatus::Approved,
        }
    }

    pub fn rule(&self) -> Option<PolicyRule> {
        match self {
            PolicyDecision::Pending => None,
            PolicyDecision::AutoApproved(rule) => Some(*rule),
        }
    }
}

/// Decide the initial status of a refund. First matching rule wins.
pub fn decide(policy: &RefundPolicy, input: &PolicyInput<'_>) -> Result<PolicyDecision> {
    if !policy.enabled {
        return Err(RefundError::PolicyRejection(
            "refunds are currently disabled".to_string(),
        ));
    }

    if !policy.allows_payment_method(input.payment_method) {
        return Err(RefundError::PolicyRejection(format!(
            "payment method '{}' is not allowed for refunds",
            input.payment_method
        )));
    }

    if policy.auto_approve_small_amounts && *input.refund_amount <= policy.small_amount_threshold {
        return Ok(PolicyDecision::AutoApproved(PolicyRule::SmallAmount));
    }

    // A manager above the cap escalates even when approval is otherwise off.
    if input.authorized_by == RESTAURANT_MANAGER && *input.refund_amount > policy.max_manager_refund
    {
        return Ok(PolicyDecision::Pending);
    }

    if !policy.require_approval || *input.refund_amount <= policy.approval_threshold {
        return Ok(PolicyDecision::AutoApproved(PolicyRule::BelowThreshold));
    }

    Ok(PolicyDecision::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::decimal;

    fn policy() -> RefundPolicy {
        RefundPolicy {
            enabled: true,
            require_approval: true,
            approval_threshold: decimal("100").unwrap(),
            auto_approve_small_amounts: true,
            small_amount_threshold: decimal("50").unwrap(),
            max_manager_refund: decimal("50").unwrap(),
            allowed_payment_methods: ["cash", "card"].into_iter().map(String::from).collect(),
        }
    }

    fn run(policy: &RefundPolicy, amount: &str, method: &str, who: &str) -> Result<PolicyDecision> {
        let amount = decimal(amount).unwrap();
        decide(
            policy,
            &PolicyInput {
                refund_amount: &amount,
                payment_method: method,
                authorized_by: who,
            },
        )
    }

    #[test]
    fn test_disabled_rejects_creation() {
        let mut p = policy();
        p.enabled = false;
        let err = run(&p, "1.00", "cash", "Shift Lead").unwrap_err();
        assert!(matches!(err, RefundError::PolicyRejection(_)));
    }

    #[test]
    fn test_disallowed_method_rejects_creation() {
        let err = run(&policy(), "1.00", "crypto", "Shift Lead").unwrap_err();
        assert!(matches!(err, RefundError::PolicyRejection(ref m) if m.contains("crypto")));
    }

    #[test]
    fn test_disabled_wins_over_method_check() {
        let mut p = policy();
        p.enabled = false;
        let err = run(&p, "1.00", "crypto", "Shift Lead").unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_small_amount_boundary() {
        let mut p = policy();
        p.approval_threshold = decimal("40").unwrap();
        p.max_manager_refund = decimal("1000").unwrap();

        assert_eq!(
            run(&p, "50.00", "cash", "Shift Lead").unwrap(),
            PolicyDecision::AutoApproved(PolicyRule::SmallAmount)
        );
        assert_eq!(run(&p, "50.01", "cash", "Shift Lead").unwrap(), PolicyDecision::Pending);
    }

    #[test]
    fn test_manager_cap_escalates_even_without_required_approval() {
        let mut p = policy();
        p.require_approval = false;
        let decision = run(&p, "100.00", "cash", RESTAURANT_MANAGER).unwrap();
        assert_eq!(decision, PolicyDecision::Pending);
        assert_eq!(decision.status(), RefundStatus::Pending);
    }

    #[test]
    fn test_small_amount_beats_manager_cap() {
        let mut p = policy();
        p.max_manager_refund = decimal("10").unwrap();
        assert_eq!(
            run(&p, "20.00", "cash", RESTAURANT_MANAGER).unwrap(),
            PolicyDecision::AutoApproved(PolicyRule::SmallAmount)
        );
    }

    #[test]
    fn test_manager_within_cap_uses_threshold() {
        let mut p = policy();
        p.max_manager_refund = decimal("500").unwrap();
        assert_eq!(
            run(&p, "80.00", "card", RESTAURANT_MANAGER).unwrap(),
            PolicyDecision::AutoApproved(PolicyRule::BelowThreshold)
        );
        assert_eq!(run(&p, "150.00", "card", RESTAURANT_MANAGER).unwrap(), PolicyDecision::Pending);
    }

    #[test]
    fn test_below_threshold_auto_approves() {
        let decision = run(&policy(), "100.00", "card", "Shift Lead").unwrap();
        assert_eq!(decision, PolicyDecision::AutoApproved(PolicyRule::BelowThreshold));
        assert_eq!(decision.status(), RefundStatus::Approved);
        assert_eq!(decision.rule().unwrap().label(), "Auto-approved (Below Threshold)");
    }

    #[test]
    fn test_no_required_approval_auto_approves_anything() {
        let mut p = policy();
        p.require_approval = false;
        assert_eq!(
            run(&p, "9000.00", "card", "Shift Lead").unwrap(),
            PolicyDecision::AutoApproved(PolicyRule::BelowThreshold)
        );
    }

    #[test]
    fn test_above_threshold_needs_approval() {
        assert_eq!(
            run(&policy(), "100.01", "card", "Shift Lead").unwrap(),
            PolicyDecision::Pending
        );
    }

    #[test]
    fn test_small_amounts_off_falls_through() {
        let mut p = policy();
        p.auto_approve_small_amounts = false;
        p.approval_threshold = decimal("5").unwrap();
        assert_eq!(
            run(&p, "1.00", "cash", "Shift Lead").unwrap(),
            PolicyDecision::AutoApproved(PolicyRule::BelowThreshold)
        );
        assert_eq!(run(&p, "6.00", "cash", "Shift Lead").unwrap(), PolicyDecision::Pending);
    }

    #[test]
    fn test_policy_json_uses_defaults_for_missing_keys() {
        let p: RefundPolicy = serde_json::from_value(serde_json::json!({
            "enabled": false,
            "approvalThreshold": 75.5,
            "allowedPaymentMethods": ["cash"]
        }))
        .unwrap();
        assert!(!p.enabled);
        assert_eq!(p.approval_threshold, decimal("75.5").unwrap());
        assert!(p.allows_payment_method("cash"));
        assert!(!p.allows_payment_method("card"));
        assert_eq!(p.max_manager_refund, BigDecimal::from(500));
    }
}
