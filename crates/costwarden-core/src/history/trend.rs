//! Period-over-period cost trend analysis.

use super::aggregator::{CostHistoryRecord, Granularity};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Direction of a period-over-period cost change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Changes within this band (percent) are classified as stable.
const STABLE_BAND_PCT: f64 = 5.0;

impl TrendDirection {
    /// Classifies a percentage change.
    pub fn from_change(change_percent: f64) -> Self {
        if change_percent.abs() <= STABLE_BAND_PCT {
            TrendDirection::Stable
        } else if change_percent > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        }
    }
}

/// Cost trend for one period transition. Ephemeral, recomputed per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostTrend {
    /// Bucket label of the period.
    pub period: String,
    /// First day of the period.
    pub start_date: NaiveDate,
    /// Last recorded day of the period.
    pub end_date: NaiveDate,
    /// Total cost for the period.
    pub total_cost_usd: f64,
    /// Average cost per day over the period.
    pub avg_daily_cost_usd: f64,
    /// Change versus the previous period, in percent.
    pub cost_change_percent: f64,
    /// Direction classification.
    pub direction: TrendDirection,
    /// Highest cost seen in the period.
    pub peak_cost_usd: f64,
    /// Day of the peak.
    pub peak_date: NaiveDate,
    /// Lowest cost seen in the period.
    pub low_cost_usd: f64,
    /// Day of the low.
    pub low_date: NaiveDate,
    /// Absolute cost change versus the previous period.
    pub cost_variance_usd: f64,
    /// Naive projection for the next period at the current rate of change.
    pub forecast_next_period_usd: f64,
}

/// Computes one trend per consecutive pair of period buckets.
///
/// N buckets yield N-1 trends; the first bucket has no prior period to
/// compare against and produces none.
pub fn analyze_trends(buckets: &[CostHistoryRecord], granularity: Granularity) -> Vec<CostTrend> {
    let mut trends = Vec::new();

    for pair in buckets.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);

        let change = curr.total_cost_usd - prev.total_cost_usd;
        let change_percent = if prev.total_cost_usd > 0.0 {
            change / prev.total_cost_usd * 100.0
        } else {
            0.0
        };

        trends.push(CostTrend {
            period: curr.period.clone(),
            start_date: curr.date,
            end_date: curr.date,
            total_cost_usd: curr.total_cost_usd,
            avg_daily_cost_usd: curr.total_cost_usd / granularity.days(),
            cost_change_percent: change_percent,
            direction: TrendDirection::from_change(change_percent),
            peak_cost_usd: curr.total_cost_usd,
            peak_date: curr.date,
            low_cost_usd: curr.total_cost_usd,
            low_date: curr.date,
            cost_variance_usd: change.abs(),
            forecast_next_period_usd: curr.total_cost_usd * (1.0 + change_percent / 100.0),
        });
    }

    trends
}
