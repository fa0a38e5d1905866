//! Daily cost history and calendar-bucket aggregation.

use crate::budget::{HistoryStore, save_or_warn};
use crate::ledger::DailyBreakdown;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Time granularity for history queries.
///
/// Daily records are the base granularity; everything coarser is derived
/// from them by summation and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Granularity {
    /// Converts granularity to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Yearly => "yearly",
        }
    }

    /// Days a bucket of this granularity spans, for per-day averages.
    pub fn days(&self) -> f64 {
        match self {
            Granularity::Daily => 1.0,
            Granularity::Weekly => 7.0,
            Granularity::Monthly => 30.0,
            Granularity::Quarterly => 90.0,
            Granularity::Yearly => 365.0,
        }
    }
}

/// One bucket of cost history: a stored daily record, or a derived
/// aggregate over a calendar bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostHistoryRecord {
    /// Unique record ID.
    pub record_id: String,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// First day of the bucket. For daily records, the day itself.
    pub date: NaiveDate,
    /// Bucket label: the date for daily, Monday's date for weekly,
    /// `YYYY-MM`, `YYYY-Qn`, or `YYYY` for coarser buckets.
    pub period: String,
    /// Total actual cost in USD.
    pub total_cost_usd: f64,
    /// Data-processing share of the cost.
    pub data_processing_cost: f64,
    /// Compute-time share of the cost.
    pub compute_cost: f64,
    /// Bytes processed.
    pub bytes_processed: u64,
    /// Compute time in slot-milliseconds.
    pub slot_ms: u64,
    /// Number of operations.
    pub total_operations: u64,
    /// Operations that completed.
    pub successful_operations: u64,
    /// Operations that failed.
    pub failed_operations: u64,
    /// Average cost per operation, recomputed from totals.
    pub avg_operation_cost: f64,
    /// Most expensive single operation.
    pub max_operation_cost: f64,
    /// Budget limit in effect.
    pub budget_limit_usd: f64,
    /// Budget consumed.
    pub budget_used_usd: f64,
    /// Budget utilization percentage.
    pub budget_utilization_pct: f64,
}

/// Monday of the week containing the given date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn bucket_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Daily => date,
        Granularity::Weekly => week_start(date),
        Granularity::Monthly => {
            NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
        }
        Granularity::Quarterly => {
            let quarter_month = ((date.month() - 1) / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap_or(date)
        }
        Granularity::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
    }
}

fn bucket_label(start: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Daily | Granularity::Weekly => start.format("%Y-%m-%d").to_string(),
        Granularity::Monthly => start.format("%Y-%m").to_string(),
        Granularity::Quarterly => {
            format!("{}-Q{}", start.year(), (start.month() - 1) / 3 + 1)
        }
        Granularity::Yearly => start.format("%Y").to_string(),
    }
}

/// Daily cost history with derived coarser views.
///
/// Daily records are the source of truth; weekly, monthly, quarterly, and
/// yearly views are recomputed from them on every query so aggregation is
/// reproducible from daily records alone.
pub struct CostHistory {
    records: Vec<CostHistoryRecord>,
    store: Box<dyn HistoryStore>,
}

impl CostHistory {
    /// Creates a history backed by the given store.
    ///
    /// A failed load starts the history empty rather than failing.
    pub fn new(store: Box<dyn HistoryStore>) -> Self {
        let mut records = match store.load() {
            Ok(records) => records,
            Err(e) => {
                warn!("could not load cost history, starting empty: {}", e);
                Vec::new()
            }
        };
        records.sort_by_key(|r| r.date);
        Self { records, store }
    }

    /// Writes the daily record for a day's ledger breakdown.
    ///
    /// Re-recording the same date replaces the existing record, so the
    /// operation is idempotent.
    pub fn record_daily(
        &mut self,
        breakdown: &DailyBreakdown,
        budget_limit_usd: f64,
    ) -> CostHistoryRecord {
        let utilization = if budget_limit_usd > 0.0 {
            breakdown.total_cost_usd / budget_limit_usd * 100.0
        } else {
            0.0
        };

        let record = CostHistoryRecord {
            record_id: format!("cost_{}_{}", breakdown.date, Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            date: breakdown.date,
            period: bucket_label(breakdown.date, Granularity::Daily),
            total_cost_usd: breakdown.total_cost_usd,
            data_processing_cost: breakdown.data_processing_cost,
            compute_cost: breakdown.compute_cost,
            bytes_processed: breakdown.bytes_processed,
            slot_ms: breakdown.slot_ms,
            total_operations: breakdown.total_operations,
            successful_operations: breakdown.successful_operations,
            failed_operations: breakdown.failed_operations,
            avg_operation_cost: breakdown.avg_operation_cost,
            max_operation_cost: breakdown.max_operation_cost,
            budget_limit_usd,
            budget_used_usd: breakdown.total_cost_usd,
            budget_utilization_pct: utilization,
        };

        self.records.retain(|r| r.date != breakdown.date);
        self.records.push(record.clone());
        self.records.sort_by_key(|r| r.date);
        save_or_warn("cost history", self.store.save(&self.records));

        record
    }

    /// Stored daily records within the date range, oldest first.
    pub fn daily_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<CostHistoryRecord> {
        self.records.iter().filter(|r| r.date >= start && r.date <= end).cloned().collect()
    }

    /// History for the date range at the requested granularity.
    ///
    /// Coarser granularities group daily records by calendar bucket and sum
    /// every additive field; per-operation averages are recomputed from the
    /// summed totals, never averaged across buckets.
    pub fn query(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Vec<CostHistoryRecord> {
        let daily = self.daily_range(start, end);
        if granularity == Granularity::Daily {
            return daily;
        }

        let mut buckets: BTreeMap<NaiveDate, Vec<&CostHistoryRecord>> = BTreeMap::new();
        for record in &daily {
            buckets.entry(bucket_start(record.date, granularity)).or_default().push(record);
        }

        buckets
            .into_iter()
            .map(|(bucket_date, members)| aggregate_bucket(bucket_date, granularity, &members))
            .collect()
    }

    /// All stored daily records, oldest first.
    pub fn daily_records(&self) -> &[CostHistoryRecord] {
        &self.records
    }

    /// Removes daily records older than the retention window.
    pub fn prune(&mut self, days_to_keep: u32) -> usize {
        let cutoff = Utc::now().date_naive() - Duration::days(i64::from(days_to_keep));
        let before = self.records.len();
        self.records.retain(|r| r.date >= cutoff);
        let removed = before - self.records.len();
        if removed > 0 {
            save_or_warn("cost history", self.store.save(&self.records));
        }
        removed
    }
}

fn aggregate_bucket(
    bucket_date: NaiveDate,
    granularity: Granularity,
    members: &[&CostHistoryRecord],
) -> CostHistoryRecord {
    let label = bucket_label(bucket_date, granularity);
    let total_cost: f64 = members.iter().map(|r| r.total_cost_usd).sum();
    let total_operations: u64 = members.iter().map(|r| r.total_operations).sum();
    let budget_limit: f64 = members.iter().map(|r| r.budget_limit_usd).sum();
    let budget_used: f64 = members.iter().map(|r| r.budget_used_usd).sum();

    CostHistoryRecord {
        record_id: format!("grouped_{}", label),
        timestamp: Utc::now(),
        date: bucket_date,
        period: label,
        total_cost_usd: total_cost,
        data_processing_cost: members.iter().map(|r| r.data_processing_cost).sum(),
        compute_cost: members.iter().map(|r| r.compute_cost).sum(),
        bytes_processed: members.iter().map(|r| r.bytes_processed).sum(),
        slot_ms: members.iter().map(|r| r.slot_ms).sum(),
        total_operations,
        successful_operations: members.iter().map(|r| r.successful_operations).sum(),
        failed_operations: members.iter().map(|r| r.failed_operations).sum(),
        avg_operation_cost: if total_operations > 0 {
            total_cost / total_operations as f64
        } else {
            0.0
        },
        max_operation_cost: members.iter().map(|r| r.max_operation_cost).fold(0.0, f64::max),
        budget_limit_usd: budget_limit,
        budget_used_usd: budget_used,
        budget_utilization_pct: if budget_limit > 0.0 {
            budget_used / budget_limit * 100.0
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::JsonHistoryStore;
    use tempfile::TempDir;

    fn test_history() -> (CostHistory, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(temp_dir.path().join("cost_history.json"));
        (CostHistory::new(Box::new(store)), temp_dir)
    }

    fn breakdown(date: NaiveDate, cost: f64, operations: u64) -> DailyBreakdown {
        DailyBreakdown {
            date,
            total_cost_usd: cost,
            data_processing_cost: cost * 0.9,
            compute_cost: cost * 0.1,
            bytes_processed: 1_000_000,
            slot_ms: 2_000,
            total_operations: operations,
            successful_operations: operations,
            failed_operations: 0,
            avg_operation_cost: if operations > 0 { cost / operations as f64 } else { 0.0 },
            max_operation_cost: cost,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2026-08-05 is a Wednesday
        assert_eq!(week_start(date(2026, 8, 5)), date(2026, 8, 3));
        assert_eq!(week_start(date(2026, 8, 3)), date(2026, 8, 3));
        assert_eq!(week_start(date(2026, 8, 9)), date(2026, 8, 3));
    }

    #[test]
    fn test_record_daily_is_upsert() {
        let (mut history, _temp) = test_history();
        let day = date(2026, 8, 1);

        history.record_daily(&breakdown(day, 1.0, 4), 5.0);
        history.record_daily(&breakdown(day, 2.5, 6), 5.0);

        assert_eq!(history.daily_records().len(), 1);
        assert_eq!(history.daily_records()[0].total_cost_usd, 2.5);
        assert_eq!(history.daily_records()[0].budget_utilization_pct, 50.0);
    }

    #[test]
    fn test_weekly_grouping_sums_by_monday() {
        let (mut history, _temp) = test_history();
        // Week of 2026-08-03 (Mon..Sun) plus one day in the next week
        history.record_daily(&breakdown(date(2026, 8, 3), 1.0, 2), 5.0);
        history.record_daily(&breakdown(date(2026, 8, 5), 2.0, 2), 5.0);
        history.record_daily(&breakdown(date(2026, 8, 10), 4.0, 1), 5.0);

        let weeks = history.query(date(2026, 8, 1), date(2026, 8, 31), Granularity::Weekly);
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].date, date(2026, 8, 3));
        assert_eq!(weeks[0].period, "2026-08-03");
        assert!((weeks[0].total_cost_usd - 3.0).abs() < 1e-9);
        assert_eq!(weeks[0].total_operations, 4);
        assert_eq!(weeks[1].date, date(2026, 8, 10));
    }

    #[test]
    fn test_monthly_aggregation_matches_daily_sum() {
        let (mut history, _temp) = test_history();
        let costs = [0.5, 1.25, 0.75, 2.0];
        for (i, cost) in costs.iter().enumerate() {
            history.record_daily(&breakdown(date(2026, 7, (i as u32) * 7 + 1), *cost, 3), 5.0);
        }

        let daily_total: f64 = history
            .daily_range(date(2026, 7, 1), date(2026, 7, 31))
            .iter()
            .map(|r| r.total_cost_usd)
            .sum();

        let months = history.query(date(2026, 7, 1), date(2026, 7, 31), Granularity::Monthly);
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].period, "2026-07");
        assert!((months[0].total_cost_usd - daily_total).abs() < 1e-9);
        // Recomputed from totals: 4.5 / 12 operations
        assert!((months[0].avg_operation_cost - 4.5 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_quarterly_and_yearly_labels() {
        let (mut history, _temp) = test_history();
        history.record_daily(&breakdown(date(2026, 2, 10), 1.0, 1), 5.0);
        history.record_daily(&breakdown(date(2026, 5, 10), 2.0, 1), 5.0);

        let quarters = history.query(date(2026, 1, 1), date(2026, 12, 31), Granularity::Quarterly);
        assert_eq!(quarters.len(), 2);
        assert_eq!(quarters[0].period, "2026-Q1");
        assert_eq!(quarters[1].period, "2026-Q2");

        let years = history.query(date(2026, 1, 1), date(2026, 12, 31), Granularity::Yearly);
        assert_eq!(years.len(), 1);
        assert_eq!(years[0].period, "2026");
        assert!((years[0].total_cost_usd - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_bucket_avg_is_zero() {
        let (mut history, _temp) = test_history();
        history.record_daily(&breakdown(date(2026, 8, 3), 0.0, 0), 5.0);

        let weeks = history.query(date(2026, 8, 1), date(2026, 8, 7), Granularity::Weekly);
        assert_eq!(weeks[0].avg_operation_cost, 0.0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cost_history.json");

        let mut history = CostHistory::new(Box::new(JsonHistoryStore::new(&path)));
        history.record_daily(&breakdown(date(2026, 8, 1), 1.5, 3), 5.0);

        let reloaded = CostHistory::new(Box::new(JsonHistoryStore::new(&path)));
        assert_eq!(reloaded.daily_records().len(), 1);
        assert_eq!(reloaded.daily_records()[0].date, date(2026, 8, 1));
        assert_eq!(reloaded.daily_records()[0].total_cost_usd, 1.5);
    }
}
