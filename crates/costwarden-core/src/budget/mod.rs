//! Budget rules, admission control, and violation tracking.
//!
//! # Example
//!
//! ```rust,no_run
//! use costwarden_core::budget::{BudgetEngine, JsonRuleStore, ScopeSpend};
//!
//! let store = JsonRuleStore::new("budget_rules.json");
//! let engine = BudgetEngine::new(Box::new(store), 5.0, 1.0);
//!
//! let spend = ScopeSpend { daily: 2.0, weekly: 9.0, monthly: 30.0 };
//! let decision = engine.can_execute(0.25, &spend);
//! if decision.allowed {
//!     // run the operation, then settle the reservation
//!     engine.settle(decision.reservation.unwrap());
//! }
//! ```

mod engine;
mod rules;
mod store;
mod violations;

pub(crate) use store::save_or_warn;

pub use engine::{
    AdmissionDecision, BudgetEngine, ReservationId, RuleEvaluation, RuleUpdate, ScopeSpend,
};
pub use rules::{
    BudgetRule, BudgetScope, EnforcementAction, EnforcementLevel, RuleStatus, default_rules,
};
pub use store::{
    HistoryStore, JsonHistoryStore, JsonRuleStore, JsonViolationStore, RuleStore, ViolationStore,
};
pub use violations::{BudgetViolation, ViolationKind, ViolationLedger, ViolationSummary};
