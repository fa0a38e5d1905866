//! Historical spending data: daily records, calendar aggregation, trend
//! analysis, and anomaly detection.
//!
//! Daily `CostHistoryRecord`s are the persisted source of truth. Coarser
//! views (weekly through yearly) and all analytics outputs are derived on
//! demand and never stored.

mod aggregator;
mod anomaly;
pub(crate) mod stats;
mod trend;

pub use aggregator::{CostHistory, CostHistoryRecord, Granularity, week_start};
pub use anomaly::{AnomalyKind, AnomalySeverity, CostAnomaly, detect_anomalies};
pub use trend::{CostTrend, TrendDirection, analyze_trends};
