//! Cost governor facade wiring estimation, admission, tracking, and
//! analytics into one engine instance.

use crate::budget::{
    AdmissionDecision, BudgetEngine, BudgetRule, BudgetScope, BudgetViolation, EnforcementAction,
    HistoryStore, JsonHistoryStore, JsonRuleStore, JsonViolationStore, ReservationId,
    RuleEvaluation, RuleStatus, RuleStore, RuleUpdate, ScopeSpend, ViolationLedger,
    ViolationStore, ViolationSummary,
};
use crate::config::GovernorConfig;
use crate::error::Result;
use crate::estimator::{CostEstimate, CostEstimator, DryRunBackend};
use crate::history::{
    CostAnomaly, CostHistory, CostHistoryRecord, CostTrend, Granularity, analyze_trends,
    detect_anomalies,
};
use crate::ledger::{CostLedger, ExecutionReport, LedgerSummary, QueryCostRecord};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Result of estimating and admitting a proposed operation in one step.
#[derive(Debug)]
pub struct OperationAdmission {
    /// The estimate, when the dry run succeeded.
    pub estimate: Option<CostEstimate>,
    /// The admission decision.
    pub decision: AdmissionDecision,
}

/// Snapshot of budget state across all enabled rules.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BudgetStatusReport {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Cumulative spend per scope.
    pub current_costs: HashMap<BudgetScope, f64>,
    /// Evaluation of every enabled rule.
    pub rule_statuses: Vec<RuleEvaluation>,
    /// Worst status across all enabled rules.
    pub overall_status: RuleStatus,
}

/// Counts removed by a retention pass.
#[derive(Debug, Clone, Copy)]
pub struct PruneReport {
    /// Ledger records removed.
    pub ledger_removed: usize,
    /// Violations removed.
    pub violations_removed: usize,
    /// Daily history records removed.
    pub history_removed: usize,
}

/// The cost-governance engine.
///
/// Decides in real time whether a metered operation may proceed, records
/// every execution's estimated vs. actual cost, rolls daily spend into
/// calendar buckets, and explains spending through trends and anomalies.
/// Construct one instance per governed project with its own stores.
pub struct CostGovernor {
    config: GovernorConfig,
    estimator: CostEstimator,
    ledger: CostLedger,
    budget: BudgetEngine,
    violations: ViolationLedger,
    history: CostHistory,
}

impl CostGovernor {
    /// Opens a governor with file-backed stores under `data_dir`.
    ///
    /// # Errors
    /// Returns error if the directory or ledger database cannot be created.
    pub fn open(
        config: GovernorConfig,
        backend: Box<dyn DryRunBackend>,
        data_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let ledger = CostLedger::open(
            data_dir.join("cost_ledger.db"),
            config.max_operation_cost_usd,
            config.pricing.clone(),
        )?;

        Self::with_stores(
            config,
            backend,
            ledger,
            Box::new(JsonRuleStore::new(data_dir.join("budget_rules.json"))),
            Box::new(JsonViolationStore::new(data_dir.join("budget_violations.json"))),
            Box::new(JsonHistoryStore::new(data_dir.join("cost_history.json"))),
        )
    }

    /// Builds a governor from explicit store implementations.
    ///
    /// # Errors
    /// Returns error if initialization fails.
    pub fn with_stores(
        config: GovernorConfig,
        backend: Box<dyn DryRunBackend>,
        ledger: CostLedger,
        rule_store: Box<dyn RuleStore>,
        violation_store: Box<dyn ViolationStore>,
        history_store: Box<dyn HistoryStore>,
    ) -> Result<Self> {
        config.validate()?;

        let estimator = CostEstimator::new(backend, config.pricing.clone());
        let budget = BudgetEngine::new(
            rule_store,
            config.daily_budget_limit_usd,
            config.max_operation_cost_usd,
        );
        let violations = ViolationLedger::new(violation_store);
        let history = CostHistory::new(history_store);

        Ok(Self { config, estimator, ledger, budget, violations, history })
    }

    /// The active configuration.
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Projects the cost of an operation via a backend dry run.
    ///
    /// # Errors
    /// Returns `GovernanceError::EstimationFailed` if the dry run fails;
    /// callers must treat that as "cost unknown", never as zero.
    pub fn estimate_cost(&self, operation: &str) -> Result<CostEstimate> {
        self.estimator.estimate(operation)
    }

    /// Cumulative spend per budget scope from the ledger.
    ///
    /// # Errors
    /// Returns error if the ledger query fails
    pub fn current_spend(&self) -> Result<ScopeSpend> {
        let now = Utc::now();
        let now_ts = now.timestamp();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(now_ts);

        Ok(ScopeSpend {
            daily: self.ledger.spend_between(day_start, now_ts + 1)?,
            weekly: self.ledger.spend_between(now_ts - 7 * 86400, now_ts + 1)?,
            monthly: self.ledger.spend_between(now_ts - 30 * 86400, now_ts + 1)?,
        })
    }

    /// Admits or denies an operation with a known projected cost.
    ///
    /// An admitted decision holds a reservation that `track` settles.
    ///
    /// # Errors
    /// Returns error if current spend cannot be read
    pub fn can_execute(&self, projected_cost_usd: f64) -> Result<AdmissionDecision> {
        let spend = self.current_spend()?;
        Ok(self.budget.can_execute(projected_cost_usd, &spend))
    }

    /// Estimates and admits an operation in one step.
    ///
    /// When estimation fails the cost is unknown and the operation is
    /// denied outright rather than treated as free.
    pub fn check_operation(&self, operation: &str) -> OperationAdmission {
        match self.estimate_cost(operation) {
            Ok(estimate) => {
                let decision = match self.can_execute(estimate.projected_cost_usd) {
                    Ok(decision) => decision,
                    Err(e) => AdmissionDecision {
                        allowed: false,
                        action: EnforcementAction::Block,
                        message: format!("Budget check failed: {}", e),
                        reservation: None,
                    },
                };
                OperationAdmission { estimate: Some(estimate), decision }
            }
            Err(e) => OperationAdmission {
                estimate: None,
                decision: AdmissionDecision {
                    allowed: false,
                    action: EnforcementAction::Block,
                    message: format!("Operation cost unknown, denied: {}", e),
                    reservation: None,
                },
            },
        }
    }

    /// Records a completed execution and settles its reservation.
    ///
    /// Must be called on both success and failure paths; spend the ledger
    /// never sees is spend no budget rule can count.
    ///
    /// # Errors
    /// Returns error if the ledger append fails
    pub fn track(
        &self,
        report: &ExecutionReport,
        reservation: Option<ReservationId>,
    ) -> Result<QueryCostRecord> {
        let record = self.ledger.track(report)?;
        if let Some(reservation) = reservation {
            self.budget.settle(reservation);
        }
        Ok(record)
    }

    /// Releases the reservation of an operation that was admitted but never
    /// ran.
    pub fn release(&self, reservation: ReservationId) {
        self.budget.settle(reservation);
    }

    /// Re-evaluates all enabled rules against post-execution spend and
    /// records one violation per breached rule.
    ///
    /// # Errors
    /// Returns error if current spend cannot be read
    pub fn enforce(&mut self, operation_type: &str) -> Result<Vec<BudgetViolation>> {
        let spend = self.current_spend()?;
        let violations = self.budget.enforce(&spend, operation_type);

        for violation in &violations {
            self.violations.record(violation.clone());
        }

        Ok(violations)
    }

    /// Snapshot of every enabled rule's status and the worst among them.
    ///
    /// # Errors
    /// Returns error if current spend cannot be read
    pub fn budget_status(&self) -> Result<BudgetStatusReport> {
        let spend = self.current_spend()?;
        let rule_statuses = self.budget.evaluate(&spend);
        let overall_status = BudgetEngine::overall_status(&rule_statuses);

        let mut current_costs = HashMap::new();
        current_costs.insert(BudgetScope::Daily, spend.daily);
        current_costs.insert(BudgetScope::Weekly, spend.weekly);
        current_costs.insert(BudgetScope::Monthly, spend.monthly);

        Ok(BudgetStatusReport {
            timestamp: Utc::now(),
            current_costs,
            rule_statuses,
            overall_status,
        })
    }

    /// Folds a day's ledger totals into the cost history.
    ///
    /// Invoked on demand by a scheduled job; re-running for the same date
    /// replaces the existing record.
    ///
    /// # Errors
    /// Returns error if the ledger query fails
    pub fn record_daily(&mut self, date: NaiveDate) -> Result<CostHistoryRecord> {
        let breakdown = self.ledger.daily_breakdown(date)?;

        let budget_limit = self
            .budget
            .rules()
            .iter()
            .find(|r| r.enabled && r.scope == BudgetScope::Daily)
            .map_or(self.config.daily_budget_limit_usd, |r| r.limit_usd);

        debug!(date = %date, cost_usd = breakdown.total_cost_usd, "recording daily cost history");
        Ok(self.history.record_daily(&breakdown, budget_limit))
    }

    /// Period-over-period trends for the trailing window, weekly buckets
    /// first, then monthly.
    pub fn analyze_trends(&self, days: u32) -> Vec<CostTrend> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(days));

        let weekly = self.history.query(start, end, Granularity::Weekly);
        let monthly = self.history.query(start, end, Granularity::Monthly);

        let mut trends = analyze_trends(&weekly, Granularity::Weekly);
        trends.extend(analyze_trends(&monthly, Granularity::Monthly));
        trends
    }

    /// Daily cost outliers in the trailing window.
    pub fn detect_anomalies(&self, days: u32) -> Vec<CostAnomaly> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(days));

        let daily = self.history.daily_range(start, end);
        detect_anomalies(&daily)
    }

    /// History for the date range at the requested granularity.
    pub fn cost_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Vec<CostHistoryRecord> {
        self.history.query(start, end, granularity)
    }

    /// Aggregate ledger statistics for the trailing window.
    ///
    /// # Errors
    /// Returns error if the ledger query fails
    pub fn ledger_summary(&self, window_days: u32) -> Result<LedgerSummary> {
        self.ledger.summary(window_days)
    }

    /// Top-N most expensive operations in the trailing window.
    ///
    /// # Errors
    /// Returns error if the ledger query fails
    pub fn expensive_operations(
        &self,
        limit: usize,
        window_days: u32,
    ) -> Result<Vec<QueryCostRecord>> {
        self.ledger.expensive(limit, window_days)
    }

    /// The current budget rule set.
    pub fn rules(&self) -> &[BudgetRule] {
        self.budget.rules()
    }

    /// Adds a budget rule after validation.
    ///
    /// # Errors
    /// Returns `GovernanceError::InvalidRule` if the rule fails validation.
    pub fn add_rule(&mut self, rule: BudgetRule) -> Result<()> {
        self.budget.add_rule(rule)
    }

    /// Updates an existing budget rule.
    ///
    /// # Errors
    /// Returns `GovernanceError::RuleNotFound` for an unknown ID.
    pub fn update_rule(&mut self, rule_id: &str, update: &RuleUpdate) -> Result<()> {
        self.budget.update_rule(rule_id, update)
    }

    /// Deletes a budget rule from future evaluation.
    ///
    /// # Errors
    /// Returns `GovernanceError::RuleNotFound` for an unknown ID.
    pub fn delete_rule(&mut self, rule_id: &str) -> Result<()> {
        self.budget.delete_rule(rule_id)
    }

    /// Violations within the trailing window, optionally filtered by
    /// resolution state.
    pub fn violations(&self, window_days: u32, resolved: Option<bool>) -> Vec<BudgetViolation> {
        self.violations.list(window_days, resolved)
    }

    /// Marks a violation resolved.
    ///
    /// # Errors
    /// Returns `GovernanceError::ViolationNotFound` for an unknown ID.
    pub fn resolve_violation(&mut self, violation_id: &str) -> Result<()> {
        self.violations.resolve(violation_id)
    }

    /// Violation counts by kind and action for the trailing window.
    pub fn violation_summary(&self, window_days: u32) -> ViolationSummary {
        self.violations.summarize(window_days)
    }

    /// Applies the configured retention windows to all stores.
    ///
    /// # Errors
    /// Returns error if ledger pruning fails
    pub fn prune(&mut self) -> Result<PruneReport> {
        Ok(PruneReport {
            ledger_removed: self.ledger.prune(self.config.ledger_retention_days)?,
            violations_removed: self.violations.prune(self.config.violation_retention_days),
            history_removed: self.history.prune(self.config.history_retention_days),
        })
    }
}
