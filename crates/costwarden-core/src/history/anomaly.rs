//! Daily cost anomaly detection via z-score statistics.

use super::aggregator::CostHistoryRecord;
use super::stats::{mean, std_dev_population};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fewest daily points needed for meaningful statistics.
const MIN_DATA_POINTS: usize = 3;

/// Z-score above which a day is flagged.
const ANOMALY_THRESHOLD: f64 = 2.0;

/// Kind of daily cost anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    /// Cost above the window mean.
    Spike,
    /// Cost below the window mean.
    Drop,
}

/// Severity of an anomaly, graded by z-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    fn from_z_score(z_score: f64) -> Self {
        if z_score > 3.0 {
            AnomalySeverity::Critical
        } else if z_score > 2.5 {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Medium
        }
    }
}

/// Detected daily cost outlier. Ephemeral, recomputed per analysis window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostAnomaly {
    /// Unique anomaly ID.
    pub anomaly_id: String,
    /// When the anomalous day was recorded.
    pub timestamp: DateTime<Utc>,
    /// The anomalous day.
    pub date: NaiveDate,
    /// Spike or drop.
    pub kind: AnomalyKind,
    /// Severity grade.
    pub severity: AnomalySeverity,
    /// Absolute difference from the expected cost.
    pub cost_difference_usd: f64,
    /// Difference as a percentage of the expected cost.
    pub percentage_change: f64,
    /// Window mean, the expected daily cost.
    pub expected_cost_usd: f64,
    /// The day's actual cost.
    pub actual_cost_usd: f64,
    /// Standard deviations from the mean.
    pub z_score: f64,
    /// Detection confidence in [0, 1].
    pub confidence_score: f64,
}

/// Flags daily cost outliers in the window using z-score statistics.
///
/// Needs at least three daily points; fewer returns empty, not an error.
/// A flat series (zero standard deviation) produces no anomalies. Results
/// are sorted most anomalous first.
pub fn detect_anomalies(daily: &[CostHistoryRecord]) -> Vec<CostAnomaly> {
    if daily.len() < MIN_DATA_POINTS {
        return Vec::new();
    }

    let costs: Vec<f64> = daily.iter().map(|r| r.total_cost_usd).collect();
    let expected = mean(&costs);
    let std_dev = std_dev_population(&costs, expected);

    if std_dev == 0.0 {
        // No variance: a perfectly flat series has no outliers.
        return Vec::new();
    }

    let mut anomalies = Vec::new();

    for record in daily {
        let difference = (record.total_cost_usd - expected).abs();
        let z_score = difference / std_dev;

        if z_score > ANOMALY_THRESHOLD {
            let kind = if record.total_cost_usd > expected {
                AnomalyKind::Spike
            } else {
                AnomalyKind::Drop
            };

            anomalies.push(CostAnomaly {
                anomaly_id: format!("anomaly_{}_{}", record.date, Uuid::new_v4().simple()),
                timestamp: record.timestamp,
                date: record.date,
                kind,
                severity: AnomalySeverity::from_z_score(z_score),
                cost_difference_usd: difference,
                percentage_change: if expected > 0.0 { difference / expected * 100.0 } else { 0.0 },
                expected_cost_usd: expected,
                actual_cost_usd: record.total_cost_usd,
                z_score,
                confidence_score: (z_score / 3.0).min(1.0),
            });
        }
    }

    anomalies
        .sort_by(|a, b| b.z_score.partial_cmp(&a.z_score).unwrap_or(std::cmp::Ordering::Equal));

    anomalies
}
