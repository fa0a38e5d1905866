//! Budget rule evaluation and admission control.

use super::rules::{
    BudgetRule, BudgetScope, EnforcementAction, EnforcementLevel, RuleStatus, default_rules,
};
use super::store::{RuleStore, save_or_warn};
use super::violations::{BudgetViolation, ViolationKind};
use crate::error::{GovernanceError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Cumulative spend per budget dimension, supplied by the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeSpend {
    /// Spend for the current day in USD.
    pub daily: f64,
    /// Spend for the trailing week in USD.
    pub weekly: f64,
    /// Spend for the trailing month in USD.
    pub monthly: f64,
}

impl ScopeSpend {
    /// Cumulative spend for a scope; per-operation has no cumulative spend.
    pub fn for_scope(&self, scope: BudgetScope) -> f64 {
        match scope {
            BudgetScope::PerOperation => 0.0,
            BudgetScope::Daily => self.daily,
            BudgetScope::Weekly => self.weekly,
            BudgetScope::Monthly => self.monthly,
        }
    }
}

/// Handle for an admitted operation's reserved cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(Uuid);

impl ReservationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Admission decision for a proposed operation.
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    /// Whether the operation may proceed.
    pub allowed: bool,
    /// The enforcement action taken.
    pub action: EnforcementAction,
    /// Human-readable explanation.
    pub message: String,
    /// Reservation held for an admitted operation. Settled by `settle` once
    /// the actual cost is tracked, or released if the operation is
    /// abandoned.
    pub reservation: Option<ReservationId>,
}

impl AdmissionDecision {
    fn denied(action: EnforcementAction, message: String) -> Self {
        Self { allowed: false, action, message, reservation: None }
    }
}

/// Evaluation of one rule at the current spend level.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleEvaluation {
    /// The evaluated rule's ID.
    pub rule_id: String,
    /// The rule's name.
    pub name: String,
    /// The rule's scope.
    pub scope: BudgetScope,
    /// Cumulative spend counted against the rule.
    pub current_amount_usd: f64,
    /// The rule's limit.
    pub limit_amount_usd: f64,
    /// Percentage of the limit used.
    pub percentage_used: f64,
    /// Health classification.
    pub status: RuleStatus,
    /// Action the classification produced.
    pub action: EnforcementAction,
}

/// Fields of a rule that may change after creation.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub limit_usd: Option<f64>,
    pub enforcement_level: Option<EnforcementLevel>,
    pub warning_threshold_pct: Option<f64>,
    pub critical_threshold_pct: Option<f64>,
    pub enabled: Option<bool>,
}

/// Budget rule engine.
///
/// Holds the rule set, admits or denies proposed operations, and
/// re-evaluates all rules post-execution. Admission is an atomic
/// check-and-reserve: the projected cost of every admitted operation is
/// held against the cumulative counters until it is settled, so two
/// concurrent admissions cannot both fit under a limit that only has room
/// for one.
pub struct BudgetEngine {
    rules: Vec<BudgetRule>,
    store: Box<dyn RuleStore>,
    reservations: Mutex<HashMap<ReservationId, f64>>,
}

impl BudgetEngine {
    /// Creates an engine backed by the given rule store.
    ///
    /// A failed or empty load installs the default rule set derived from
    /// the configured budget limits.
    pub fn new(
        store: Box<dyn RuleStore>,
        daily_budget_limit_usd: f64,
        max_operation_cost_usd: f64,
    ) -> Self {
        let rules = match store.load() {
            Ok(rules) if !rules.is_empty() => rules,
            Ok(_) => {
                info!("no budget rules found, installing defaults");
                let defaults = default_rules(daily_budget_limit_usd, max_operation_cost_usd);
                save_or_warn("budget rules", store.save(&defaults));
                defaults
            }
            Err(e) => {
                warn!("could not load budget rules, installing defaults: {}", e);
                let defaults = default_rules(daily_budget_limit_usd, max_operation_cost_usd);
                save_or_warn("budget rules", store.save(&defaults));
                defaults
            }
        };

        Self { rules, store, reservations: Mutex::new(HashMap::new()) }
    }

    /// The current rule set.
    pub fn rules(&self) -> &[BudgetRule] {
        &self.rules
    }

    /// Adds a rule after validation.
    ///
    /// # Errors
    /// Returns `GovernanceError::InvalidRule` if the rule fails validation.
    pub fn add_rule(&mut self, rule: BudgetRule) -> Result<()> {
        rule.validate()?;
        self.rules.push(rule);
        save_or_warn("budget rules", self.store.save(&self.rules));
        Ok(())
    }

    /// Applies an update to an existing rule.
    ///
    /// The updated rule is re-validated before the change is committed.
    ///
    /// # Errors
    /// Returns `GovernanceError::RuleNotFound` if the ID is unknown, or
    /// `GovernanceError::InvalidRule` if the update makes the rule invalid.
    pub fn update_rule(&mut self, rule_id: &str, update: &RuleUpdate) -> Result<()> {
        let index = self
            .rules
            .iter()
            .position(|r| r.rule_id == rule_id)
            .ok_or_else(|| GovernanceError::RuleNotFound(rule_id.to_string()))?;

        let mut updated = self.rules[index].clone();
        if let Some(ref name) = update.name {
            updated.name = name.clone();
        }
        if let Some(ref description) = update.description {
            updated.description = description.clone();
        }
        if let Some(limit_usd) = update.limit_usd {
            updated.limit_usd = limit_usd;
        }
        if let Some(enforcement_level) = update.enforcement_level {
            updated.enforcement_level = enforcement_level;
        }
        if let Some(warning_threshold_pct) = update.warning_threshold_pct {
            updated.warning_threshold_pct = warning_threshold_pct;
        }
        if let Some(critical_threshold_pct) = update.critical_threshold_pct {
            updated.critical_threshold_pct = critical_threshold_pct;
        }
        if let Some(enabled) = update.enabled {
            updated.enabled = enabled;
        }
        updated.validate()?;
        updated.updated_at = Utc::now();

        self.rules[index] = updated;
        save_or_warn("budget rules", self.store.save(&self.rules));
        Ok(())
    }

    /// Removes a rule from future evaluation.
    ///
    /// Past violations of the rule are unaffected.
    ///
    /// # Errors
    /// Returns `GovernanceError::RuleNotFound` if the ID is unknown.
    pub fn delete_rule(&mut self, rule_id: &str) -> Result<()> {
        let index = self
            .rules
            .iter()
            .position(|r| r.rule_id == rule_id)
            .ok_or_else(|| GovernanceError::RuleNotFound(rule_id.to_string()))?;

        self.rules.remove(index);
        save_or_warn("budget rules", self.store.save(&self.rules));
        Ok(())
    }

    fn first_enabled(&self, predicate: impl Fn(&BudgetRule) -> bool) -> Option<&BudgetRule> {
        self.rules.iter().find(|r| r.enabled && predicate(r))
    }

    /// Decides whether an operation with the given projected cost may run.
    ///
    /// Evaluation order: the per-operation ceiling first, then the emergency
    /// ceiling, then the daily limit; an emergency breach outranks a plain
    /// daily block when both would fire. The first denial short-circuits.
    ///
    /// On admission the projected cost is reserved against the cumulative
    /// counters; the caller must settle or release the reservation.
    pub fn can_execute(&self, projected_cost_usd: f64, spend: &ScopeSpend) -> AdmissionDecision {
        let mut reservations = self.reservations.lock().unwrap();
        let reserved: f64 = reservations.values().sum();
        let effective_daily = spend.daily + reserved;

        if let Some(rule) = self.first_enabled(|r| r.scope == BudgetScope::PerOperation) {
            if projected_cost_usd > rule.limit_usd {
                return AdmissionDecision::denied(
                    EnforcementAction::Block,
                    format!(
                        "Operation cost exceeds per-operation limit: ${:.4} > ${:.2}",
                        projected_cost_usd, rule.limit_usd
                    ),
                );
            }
        }

        let emergency_rule = self.first_enabled(|r| r.enforcement_level == EnforcementLevel::Emergency);
        if let Some(rule) = emergency_rule {
            if effective_daily + projected_cost_usd > rule.limit_usd {
                return AdmissionDecision::denied(
                    EnforcementAction::EmergencyStop,
                    format!(
                        "Emergency budget ceiling exceeded: ${:.4} + ${:.4} > ${:.2}",
                        effective_daily, projected_cost_usd, rule.limit_usd
                    ),
                );
            }
        }

        let daily_rule = self.first_enabled(|r| {
            r.scope == BudgetScope::Daily && r.enforcement_level != EnforcementLevel::Emergency
        });
        if let Some(rule) = daily_rule {
            if effective_daily + projected_cost_usd > rule.limit_usd {
                return AdmissionDecision::denied(
                    EnforcementAction::Block,
                    format!(
                        "Daily budget limit would be exceeded: ${:.4} + ${:.4} > ${:.2}",
                        effective_daily, projected_cost_usd, rule.limit_usd
                    ),
                );
            }
        }

        let reservation = ReservationId::new();
        reservations.insert(reservation, projected_cost_usd);

        AdmissionDecision {
            allowed: true,
            action: EnforcementAction::Allow,
            message: "Operation admitted within budget limits".to_string(),
            reservation: Some(reservation),
        }
    }

    /// Releases a reservation held by an admitted operation.
    ///
    /// Called once the actual cost has been tracked, or when the operation
    /// is abandoned. Unknown or already-settled reservations are ignored.
    pub fn settle(&self, reservation: ReservationId) {
        self.reservations.lock().unwrap().remove(&reservation);
    }

    /// Total projected cost currently reserved by admitted operations.
    pub fn reserved_total(&self) -> f64 {
        self.reservations.lock().unwrap().values().sum()
    }

    /// Evaluates every enabled rule against the given cumulative spend.
    pub fn evaluate(&self, spend: &ScopeSpend) -> Vec<RuleEvaluation> {
        self.rules
            .iter()
            .filter(|r| r.enabled)
            .map(|rule| {
                let current = spend.for_scope(rule.scope);
                let (status, action) = rule.classify(current);
                RuleEvaluation {
                    rule_id: rule.rule_id.clone(),
                    name: rule.name.clone(),
                    scope: rule.scope,
                    current_amount_usd: current,
                    limit_amount_usd: rule.limit_usd,
                    percentage_used: rule.percentage_used(current),
                    status,
                    action,
                }
            })
            .collect()
    }

    /// Worst status across the given evaluations.
    pub fn overall_status(evaluations: &[RuleEvaluation]) -> RuleStatus {
        evaluations.iter().map(|e| e.status).max().unwrap_or(RuleStatus::Healthy)
    }

    /// Re-evaluates all enabled rules against post-execution spend and
    /// emits one violation per breached rule.
    ///
    /// Deliberately decoupled from admission: a rule can be breached by
    /// accumulation across many individually-small operations even though
    /// each was admitted.
    pub fn enforce(&self, spend: &ScopeSpend, operation_type: &str) -> Vec<BudgetViolation> {
        let mut violations = Vec::new();

        for evaluation in self.evaluate(spend) {
            let Some(kind) = ViolationKind::from_status(evaluation.status) else {
                continue;
            };

            let message = format!(
                "Budget {}: {} - ${:.4} / ${:.2} ({:.1}%)",
                evaluation.status.as_str(),
                evaluation.name,
                evaluation.current_amount_usd,
                evaluation.limit_amount_usd,
                evaluation.percentage_used
            );

            if evaluation.action == EnforcementAction::EmergencyStop {
                warn!(operation_type, "emergency budget violation: {}", message);
            } else {
                info!(operation_type, "budget violation: {}", message);
            }

            violations.push(BudgetViolation::new(
                evaluation.rule_id,
                kind,
                evaluation.current_amount_usd,
                evaluation.limit_amount_usd,
                evaluation.percentage_used,
                evaluation.action,
                message,
            ));
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::store::JsonRuleStore;
    use tempfile::TempDir;

    fn test_engine() -> (BudgetEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonRuleStore::new(temp_dir.path().join("budget_rules.json"));
        (BudgetEngine::new(Box::new(store), 5.0, 1.0), temp_dir)
    }

    #[test]
    fn test_empty_store_installs_defaults() {
        let (engine, _temp) = test_engine();
        assert_eq!(engine.rules().len(), 4);
    }

    #[test]
    fn test_defaults_persist_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget_rules.json");

        let first = BudgetEngine::new(Box::new(JsonRuleStore::new(&path)), 5.0, 1.0);
        let first_ids: Vec<String> = first.rules().iter().map(|r| r.rule_id.clone()).collect();

        let second = BudgetEngine::new(Box::new(JsonRuleStore::new(&path)), 5.0, 1.0);
        let second_ids: Vec<String> = second.rules().iter().map(|r| r.rule_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_add_rule_rejects_invalid() {
        let (mut engine, _temp) = test_engine();
        let rule = BudgetRule::new("bad", BudgetScope::Monthly, -1.0, EnforcementLevel::Blocking);
        assert!(matches!(engine.add_rule(rule), Err(GovernanceError::InvalidRule(_))));
        assert_eq!(engine.rules().len(), 4);
    }

    #[test]
    fn test_update_rule_not_found() {
        let (mut engine, _temp) = test_engine();
        let result = engine.update_rule("rule_missing", &RuleUpdate::default());
        assert!(matches!(result, Err(GovernanceError::RuleNotFound(_))));
    }

    #[test]
    fn test_update_rule_rejects_invalid_change() {
        let (mut engine, _temp) = test_engine();
        let rule_id = engine.rules()[0].rule_id.clone();

        let update = RuleUpdate { limit_usd: Some(-3.0), ..RuleUpdate::default() };
        assert!(matches!(engine.update_rule(&rule_id, &update), Err(GovernanceError::InvalidRule(_))));
        // Original rule untouched
        assert!(engine.rules()[0].limit_usd > 0.0);
    }

    #[test]
    fn test_delete_rule() {
        let (mut engine, _temp) = test_engine();
        let rule_id = engine.rules()[0].rule_id.clone();
        engine.delete_rule(&rule_id).unwrap();
        assert_eq!(engine.rules().len(), 3);
        assert!(matches!(engine.delete_rule(&rule_id), Err(GovernanceError::RuleNotFound(_))));
    }

    #[test]
    fn test_admission_within_limits() {
        let (engine, _temp) = test_engine();
        let decision = engine.can_execute(0.50, &ScopeSpend::default());
        assert!(decision.allowed);
        assert_eq!(decision.action, EnforcementAction::Allow);
        assert!(decision.reservation.is_some());
    }

    #[test]
    fn test_per_operation_check_fires_first() {
        // Per-operation $1.00, daily $5.00 with $4.50 spent: an operation
        // over both limits is denied by the per-operation ceiling.
        let (engine, _temp) = test_engine();
        let spend = ScopeSpend { daily: 4.50, ..ScopeSpend::default() };

        let decision = engine.can_execute(1.80, &spend);
        assert!(!decision.allowed);
        assert_eq!(decision.action, EnforcementAction::Block);
        assert!(decision.message.contains("per-operation"));
    }

    #[test]
    fn test_daily_projection_blocks() {
        let (engine, _temp) = test_engine();
        let spend = ScopeSpend { daily: 4.50, ..ScopeSpend::default() };

        let decision = engine.can_execute(0.80, &spend);
        assert!(!decision.allowed);
        assert_eq!(decision.action, EnforcementAction::Block);
        assert!(decision.message.contains("Daily budget limit"));
    }

    #[test]
    fn test_emergency_outranks_daily_block() {
        // Daily limit $5.00, emergency ceiling $7.50, $4.00 spent: a $4.00
        // operation breaches both; the emergency stop wins.
        let (engine, _temp) = test_engine();
        let spend = ScopeSpend { daily: 4.00, ..ScopeSpend::default() };

        let decision = engine.can_execute(4.00, &spend);
        assert!(!decision.allowed);
        assert_eq!(decision.action, EnforcementAction::EmergencyStop);
    }

    #[test]
    fn test_admission_monotonicity() {
        let (engine, _temp) = test_engine();
        let spend = ScopeSpend { daily: 4.50, ..ScopeSpend::default() };

        assert!(!engine.can_execute(0.80, &spend).allowed);
        for cost in [0.80, 1.00, 2.50, 10.0] {
            assert!(!engine.can_execute(cost, &spend).allowed);
        }
    }

    #[test]
    fn test_reservation_closes_admission_race() {
        // $5 daily limit with $4.20 spent leaves room for one $0.50
        // operation, not two.
        let (engine, _temp) = test_engine();
        let spend = ScopeSpend { daily: 4.20, ..ScopeSpend::default() };

        let first = engine.can_execute(0.50, &spend);
        assert!(first.allowed);

        let second = engine.can_execute(0.50, &spend);
        assert!(!second.allowed);

        // Settling the first reservation frees the head-room again
        engine.settle(first.reservation.unwrap());
        let third = engine.can_execute(0.50, &spend);
        assert!(third.allowed);
    }

    #[test]
    fn test_enforce_emits_violation_per_breached_rule() {
        let (engine, _temp) = test_engine();
        // $4.9 today: daily rule (warn at 80%, crit at 95%) is critical at
        // 98%; the emergency rule ($7.50, warn at 100%) is still healthy.
        let spend = ScopeSpend { daily: 4.9, weekly: 4.9, monthly: 4.9 };

        let violations = engine.enforce(&spend, "analysis");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Emergency);
        assert_eq!(violations[0].action, EnforcementAction::Block);
        assert!(violations[0].message.contains("critical"));
    }

    #[test]
    fn test_enforce_accumulation_without_admission_denial() {
        // Each operation was individually small, but the day's total
        // crosses the warning threshold.
        let (engine, _temp) = test_engine();
        let spend = ScopeSpend { daily: 4.2, weekly: 4.2, monthly: 4.2 };

        let violations = engine.enforce(&spend, "analysis");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::ThresholdExceeded);
        assert_eq!(violations[0].action, EnforcementAction::Warn);
    }

    #[test]
    fn test_overall_status_is_worst() {
        let (engine, _temp) = test_engine();
        let healthy = engine.evaluate(&ScopeSpend::default());
        assert_eq!(BudgetEngine::overall_status(&healthy), RuleStatus::Healthy);

        let stressed = engine.evaluate(&ScopeSpend { daily: 4.9, weekly: 4.9, monthly: 4.9 });
        assert_eq!(BudgetEngine::overall_status(&stressed), RuleStatus::Critical);
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let (mut engine, _temp) = test_engine();
        let daily_id = engine
            .rules()
            .iter()
            .find(|r| r.scope == BudgetScope::Daily && r.enforcement_level != EnforcementLevel::Emergency)
            .unwrap()
            .rule_id
            .clone();

        let update = RuleUpdate { enabled: Some(false), ..RuleUpdate::default() };
        engine.update_rule(&daily_id, &update).unwrap();

        // Only the emergency ceiling still constrains the projection
        let spend = ScopeSpend { daily: 4.50, ..ScopeSpend::default() };
        assert!(engine.can_execute(0.80, &spend).allowed);
    }
}
