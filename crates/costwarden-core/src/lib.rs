//! Costwarden Core - Cost governance for metered analytical workloads.
//!
//! This crate decides, in real time, whether a billable operation may
//! proceed, and tracks, aggregates, and explains spending over time:
//! - Pre-execution cost estimation via backend dry runs
//! - Budget rules with priority-ordered admission control
//! - An append-only ledger of estimated vs. actual costs
//! - Daily history with weekly/monthly/quarterly/yearly rollups
//! - Trend and anomaly analytics over aggregated spend
//!
//! # Example
//!
//! ```rust,no_run
//! use costwarden_core::{CostGovernor, ExecutionReport, GovernorConfig};
//! # use costwarden_core::estimator::DryRunBackend;
//! # struct Backend;
//! # impl DryRunBackend for Backend {
//! #     fn dry_run(&self, _operation: &str) -> costwarden_core::Result<u64> { Ok(0) }
//! # }
//!
//! # fn main() -> costwarden_core::Result<()> {
//! let config = GovernorConfig::load("costwarden.toml")?;
//! let mut governor = CostGovernor::open(config, Box::new(Backend), ".costwarden")?;
//!
//! let admission = governor.check_operation("SELECT * FROM events");
//! if admission.decision.allowed {
//!     let estimate = admission.estimate.unwrap();
//!     // ... run the operation against the backend ...
//!     governor.track(
//!         &ExecutionReport::new("SELECT * FROM events", "analysis")
//!             .with_costs(estimate.projected_cost_usd, 0.42),
//!         admission.decision.reservation,
//!     )?;
//!     governor.enforce("analysis")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod config;
pub mod error;
pub mod estimator;
pub mod governor;
pub mod history;
pub mod ledger;
pub mod pricing;

pub use budget::{
    AdmissionDecision, BudgetEngine, BudgetRule, BudgetScope, BudgetViolation, EnforcementAction,
    EnforcementLevel, ReservationId, RuleStatus, RuleUpdate, ScopeSpend, ViolationKind,
    ViolationLedger, ViolationSummary,
};
pub use config::GovernorConfig;
pub use error::{GovernanceError, Result};
pub use estimator::{CostEstimate, CostEstimator, DryRunBackend};
pub use governor::{BudgetStatusReport, CostGovernor, OperationAdmission, PruneReport};
pub use history::{
    AnomalyKind, AnomalySeverity, CostAnomaly, CostHistory, CostHistoryRecord, CostTrend,
    Granularity, TrendDirection,
};
pub use ledger::{
    CostLedger, DailyBreakdown, ExecutionReport, LedgerSummary, Priority, QueryCostRecord,
    RecordStatus,
};
pub use pricing::PricingConfig;
