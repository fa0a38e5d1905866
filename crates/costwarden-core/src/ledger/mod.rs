//! Append-only cost ledger.
//!
//! Every tracked operation produces one immutable `QueryCostRecord` with
//! estimated vs. actual cost, resource volumes, timing, and a derived
//! priority tag. Records are never updated or deleted individually; only
//! bulk retention pruning removes them by age.

pub(crate) mod schema;
mod store;

pub use schema::initialize_schema;
pub use store::{
    CostLedger, DailyBreakdown, ExecutionReport, LedgerSummary, Priority, PriorityBreakdown,
    QueryCostRecord, RecordStatus, TypeBreakdown,
};
