//! Budget rules and enforcement classification.

use crate::error::{GovernanceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Budget dimension a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    /// Ceiling on a single operation.
    PerOperation,
    /// Cumulative spend for the current day.
    Daily,
    /// Cumulative spend for the trailing week.
    Weekly,
    /// Cumulative spend for the trailing month.
    Monthly,
}

impl BudgetScope {
    /// Converts scope to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            BudgetScope::PerOperation => "per_operation",
            BudgetScope::Daily => "daily",
            BudgetScope::Weekly => "weekly",
            BudgetScope::Monthly => "monthly",
        }
    }
}

/// Configured strictness class of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    /// Observe only.
    Monitoring,
    /// Surface warnings.
    Warning,
    /// Slow down admissions.
    Throttling,
    /// Deny admissions over the limit.
    Blocking,
    /// Hard stop with highest precedence.
    Emergency,
}

/// Concrete decision returned for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    Allow,
    Warn,
    Throttle,
    Block,
    EmergencyStop,
}

impl EnforcementAction {
    /// Converts action to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            EnforcementAction::Allow => "allow",
            EnforcementAction::Warn => "warn",
            EnforcementAction::Throttle => "throttle",
            EnforcementAction::Block => "block",
            EnforcementAction::EmergencyStop => "emergency_stop",
        }
    }
}

/// Health classification of a rule at the current spend level.
///
/// Variants are ordered from best to worst so `Ord` picks the overall
/// status as the maximum across rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Healthy,
    Warning,
    Exceeded,
    Critical,
}

impl RuleStatus {
    /// Converts status to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            RuleStatus::Healthy => "healthy",
            RuleStatus::Warning => "warning",
            RuleStatus::Exceeded => "exceeded",
            RuleStatus::Critical => "critical",
        }
    }

    /// Whether this status breaches the rule.
    pub fn is_violation(&self) -> bool {
        !matches!(self, RuleStatus::Healthy)
    }
}

/// Individual budget rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRule {
    /// Unique rule ID.
    pub rule_id: String,
    /// Human-readable name.
    pub name: String,
    /// What the rule is for.
    pub description: String,
    /// Budget dimension the rule applies to.
    pub scope: BudgetScope,
    /// Spending limit in USD. Must be positive.
    pub limit_usd: f64,
    /// Strictness class.
    pub enforcement_level: EnforcementLevel,
    /// Actions this rule is allowed to take.
    pub allowed_actions: Vec<EnforcementAction>,
    /// Warning threshold as a percentage of the limit.
    pub warning_threshold_pct: f64,
    /// Critical threshold as a percentage of the limit.
    pub critical_threshold_pct: f64,
    /// Whether the rule participates in evaluation.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl BudgetRule {
    /// Creates an enabled rule with a fresh ID.
    pub fn new(
        name: impl Into<String>,
        scope: BudgetScope,
        limit_usd: f64,
        enforcement_level: EnforcementLevel,
    ) -> Self {
        let now = Utc::now();
        Self {
            rule_id: format!("rule_{}", Uuid::new_v4().simple()),
            name: name.into(),
            description: String::new(),
            scope,
            limit_usd,
            enforcement_level,
            allowed_actions: vec![EnforcementAction::Warn, EnforcementAction::Block],
            warning_threshold_pct: 80.0,
            critical_threshold_pct: 95.0,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets warning and critical thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, warning_pct: f64, critical_pct: f64) -> Self {
        self.warning_threshold_pct = warning_pct;
        self.critical_threshold_pct = critical_pct;
        self
    }

    /// Sets the allowed actions.
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<EnforcementAction>) -> Self {
        self.allowed_actions = actions;
        self
    }

    /// Validates limit and threshold configuration.
    ///
    /// # Errors
    /// Returns `GovernanceError::InvalidRule` if the limit is not positive or
    /// the thresholds are not strictly ordered.
    pub fn validate(&self) -> Result<()> {
        if self.limit_usd <= 0.0 {
            return Err(GovernanceError::InvalidRule(format!(
                "rule '{}': limit_usd must be > 0.0",
                self.name
            )));
        }
        if self.warning_threshold_pct <= 0.0 {
            return Err(GovernanceError::InvalidRule(format!(
                "rule '{}': warning_threshold_pct must be > 0.0",
                self.name
            )));
        }
        if self.warning_threshold_pct >= self.critical_threshold_pct {
            return Err(GovernanceError::InvalidRule(format!(
                "rule '{}': warning_threshold_pct must be below critical_threshold_pct",
                self.name
            )));
        }
        Ok(())
    }

    /// Percentage of the limit the given spend represents.
    pub fn percentage_used(&self, current_usd: f64) -> f64 {
        if self.limit_usd > 0.0 { current_usd / self.limit_usd * 100.0 } else { 0.0 }
    }

    /// Classifies the current spend against this rule.
    ///
    /// Precedence is fixed, first match wins: critical threshold, then the
    /// 100% line, then the warning threshold.
    pub fn classify(&self, current_usd: f64) -> (RuleStatus, EnforcementAction) {
        let pct = self.percentage_used(current_usd);

        if pct >= self.critical_threshold_pct {
            let action = if self.enforcement_level == EnforcementLevel::Emergency {
                EnforcementAction::EmergencyStop
            } else {
                EnforcementAction::Block
            };
            (RuleStatus::Critical, action)
        } else if pct >= 100.0 {
            (RuleStatus::Exceeded, EnforcementAction::Block)
        } else if pct >= self.warning_threshold_pct {
            (RuleStatus::Warning, EnforcementAction::Warn)
        } else {
            (RuleStatus::Healthy, EnforcementAction::Allow)
        }
    }
}

/// Default rule set installed when the rule store is empty.
pub fn default_rules(daily_budget_limit_usd: f64, max_operation_cost_usd: f64) -> Vec<BudgetRule> {
    vec![
        BudgetRule::new(
            "Daily Budget Limit",
            BudgetScope::Daily,
            daily_budget_limit_usd,
            EnforcementLevel::Blocking,
        )
        .with_description("Daily spending limit for metered operations")
        .with_thresholds(80.0, 95.0),
        BudgetRule::new(
            "Per-Operation Cost Limit",
            BudgetScope::PerOperation,
            max_operation_cost_usd,
            EnforcementLevel::Blocking,
        )
        .with_description("Maximum cost of a single operation")
        .with_thresholds(80.0, 100.0),
        BudgetRule::new(
            "Weekly Budget Limit",
            BudgetScope::Weekly,
            daily_budget_limit_usd * 7.0,
            EnforcementLevel::Throttling,
        )
        .with_description("Weekly spending limit")
        .with_thresholds(75.0, 90.0)
        .with_actions(vec![EnforcementAction::Warn, EnforcementAction::Throttle]),
        BudgetRule::new(
            "Emergency Budget Limit",
            BudgetScope::Daily,
            daily_budget_limit_usd * 1.5,
            EnforcementLevel::Emergency,
        )
        .with_description("Hard stop when the daily budget is severely exceeded")
        .with_thresholds(100.0, 150.0)
        .with_actions(vec![EnforcementAction::EmergencyStop]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_positive_limit() {
        let rule = BudgetRule::new("bad", BudgetScope::Daily, 0.0, EnforcementLevel::Blocking);
        assert!(matches!(rule.validate(), Err(GovernanceError::InvalidRule(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let rule = BudgetRule::new("bad", BudgetScope::Daily, 5.0, EnforcementLevel::Blocking)
            .with_thresholds(95.0, 80.0);
        assert!(matches!(rule.validate(), Err(GovernanceError::InvalidRule(_))));

        let equal = BudgetRule::new("bad", BudgetScope::Daily, 5.0, EnforcementLevel::Blocking)
            .with_thresholds(90.0, 90.0);
        assert!(equal.validate().is_err());
    }

    #[test]
    fn test_classify_precedence() {
        let rule = BudgetRule::new("daily", BudgetScope::Daily, 10.0, EnforcementLevel::Blocking)
            .with_thresholds(80.0, 95.0);

        assert_eq!(rule.classify(5.0), (RuleStatus::Healthy, EnforcementAction::Allow));
        assert_eq!(rule.classify(8.0), (RuleStatus::Warning, EnforcementAction::Warn));
        assert_eq!(rule.classify(9.5), (RuleStatus::Critical, EnforcementAction::Block));
        // Critical threshold outranks the 100% line
        assert_eq!(rule.classify(12.0), (RuleStatus::Critical, EnforcementAction::Block));
    }

    #[test]
    fn test_classify_exceeded_below_critical_threshold() {
        // Critical at 150% leaves an exceeded band between 100% and 150%
        let rule = BudgetRule::new("emergency", BudgetScope::Daily, 10.0, EnforcementLevel::Emergency)
            .with_thresholds(100.0, 150.0);

        assert_eq!(rule.classify(12.0), (RuleStatus::Exceeded, EnforcementAction::Block));
        assert_eq!(rule.classify(16.0), (RuleStatus::Critical, EnforcementAction::EmergencyStop));
    }

    #[test]
    fn test_emergency_level_critical_action() {
        let rule = BudgetRule::new("emergency", BudgetScope::Daily, 10.0, EnforcementLevel::Emergency)
            .with_thresholds(80.0, 95.0);
        let (status, action) = rule.classify(10.0);
        assert_eq!(status, RuleStatus::Critical);
        assert_eq!(action, EnforcementAction::EmergencyStop);
    }

    #[test]
    fn test_status_ordering_for_worst_of() {
        assert!(RuleStatus::Critical > RuleStatus::Exceeded);
        assert!(RuleStatus::Exceeded > RuleStatus::Warning);
        assert!(RuleStatus::Warning > RuleStatus::Healthy);
    }

    #[test]
    fn test_default_rules_are_valid() {
        let rules = default_rules(5.0, 1.0);
        assert_eq!(rules.len(), 4);
        for rule in &rules {
            rule.validate().unwrap();
        }

        let emergency =
            rules.iter().find(|r| r.enforcement_level == EnforcementLevel::Emergency).unwrap();
        assert_eq!(emergency.limit_usd, 7.5);
    }

    #[test]
    fn test_scope_serializes_to_snake_case() {
        let json = serde_json::to_string(&BudgetScope::PerOperation).unwrap();
        assert_eq!(json, "\"per_operation\"");
        let back: BudgetScope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BudgetScope::PerOperation);
    }
}
