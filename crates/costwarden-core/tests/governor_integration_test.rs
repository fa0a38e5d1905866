//! End-to-end tests for the cost governor: admission precedence,
//! enforcement, and history aggregation.

use chrono::{Duration, NaiveDate, Utc};
use costwarden_core::estimator::DryRunBackend;
use costwarden_core::{
    CostGovernor, EnforcementAction, ExecutionReport, Granularity, GovernorConfig, Result,
    TrendDirection,
};
use tempfile::TempDir;

struct FixedBackend {
    bytes: u64,
}

impl DryRunBackend for FixedBackend {
    fn dry_run(&self, _operation: &str) -> Result<u64> {
        Ok(self.bytes)
    }
}

fn open_governor(temp_dir: &TempDir) -> CostGovernor {
    // Defaults: $5 daily budget, $1 per-operation limit, $7.50 emergency ceiling
    CostGovernor::open(
        GovernorConfig::default(),
        Box::new(FixedBackend { bytes: 0 }),
        temp_dir.path(),
    )
    .unwrap()
}

fn spend(governor: &CostGovernor, amount: f64) {
    governor
        .track(&ExecutionReport::new("spend", "analysis").with_costs(amount, amount), None)
        .unwrap();
}

#[test]
fn test_per_operation_check_fires_before_daily() {
    let temp_dir = TempDir::new().unwrap();
    let governor = open_governor(&temp_dir);

    // $4.50 already spent today; a $1.80 operation breaches both the
    // per-operation limit and the daily projection.
    spend(&governor, 4.50);

    let decision = governor.can_execute(1.80).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.action, EnforcementAction::Block);
    assert!(decision.message.contains("per-operation"));
}

#[test]
fn test_emergency_stop_overrides_daily_block() {
    let temp_dir = TempDir::new().unwrap();
    let governor = open_governor(&temp_dir);

    // $4.00 spent; $4.00 more totals $8.00, over both the $5.00 daily limit
    // and the $7.50 emergency ceiling. The emergency stop wins.
    spend(&governor, 4.00);

    let decision = governor.can_execute(4.00).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.action, EnforcementAction::EmergencyStop);
}

#[test]
fn test_admission_monotonicity() {
    let temp_dir = TempDir::new().unwrap();
    let governor = open_governor(&temp_dir);

    spend(&governor, 4.50);

    // Denied at $0.80; every larger cost is denied too
    assert!(!governor.can_execute(0.80).unwrap().allowed);
    for cost in [0.85, 0.99, 1.50, 100.0] {
        assert!(!governor.can_execute(cost).unwrap().allowed, "cost {cost} admitted");
    }
}

#[test]
fn test_ledger_accuracy_invariant() {
    let temp_dir = TempDir::new().unwrap();
    let governor = open_governor(&temp_dir);

    for (estimated, actual) in [(0.10, 0.12), (0.25, 0.20), (0.0, 0.05)] {
        let record = governor
            .track(
                &ExecutionReport::new("op", "analysis").with_costs(estimated, actual),
                None,
            )
            .unwrap();
        assert_eq!(record.cost_difference_usd, record.actual_cost_usd - record.estimated_cost_usd);
    }

    let summary = governor.ledger_summary(1).unwrap();
    assert_eq!(summary.total_operations, 3);
    assert!((summary.total_actual_cost_usd - 0.37).abs() < 1e-9);
}

#[test]
fn test_monthly_aggregation_matches_daily_sum() {
    let temp_dir = TempDir::new().unwrap();
    let mut governor = open_governor(&temp_dir);

    // Spread operations across several days of one month, then roll up
    let days = [
        (NaiveDate::from_ymd_opt(2026, 6, 2).unwrap(), 0.40),
        (NaiveDate::from_ymd_opt(2026, 6, 9).unwrap(), 1.10),
        (NaiveDate::from_ymd_opt(2026, 6, 17).unwrap(), 0.75),
        (NaiveDate::from_ymd_opt(2026, 6, 28).unwrap(), 2.05),
    ];

    for (date, cost) in days {
        let at = date.and_hms_opt(12, 0, 0).unwrap().and_utc();
        governor
            .track(
                &ExecutionReport::new("op", "analysis")
                    .with_costs(cost, cost)
                    .with_recorded_at(at),
                None,
            )
            .unwrap();
        governor.record_daily(date).unwrap();
    }

    let start = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();

    let daily_total: f64 = governor
        .cost_history(start, end, Granularity::Daily)
        .iter()
        .map(|r| r.total_cost_usd)
        .sum();
    let monthly = governor.cost_history(start, end, Granularity::Monthly);

    assert_eq!(monthly.len(), 1);
    assert_eq!(monthly[0].period, "2026-06");
    assert!((monthly[0].total_cost_usd - daily_total).abs() < 1e-9);
    assert!((daily_total - 4.30).abs() < 1e-9);
}

#[test]
fn test_trend_directions_over_recorded_weeks() {
    let temp_dir = TempDir::new().unwrap();
    let mut governor = open_governor(&temp_dir);

    // Three Mondays of recent history: $10, $10.40 (stable), then $12.48
    // (a 20% jump). Costs land within the governor's trend window.
    let this_monday = {
        let today = Utc::now().date_naive();
        today - Duration::days(i64::from(chrono::Datelike::weekday(&today).num_days_from_monday()))
    };
    let weeks = [
        (this_monday - Duration::days(14), 10.00),
        (this_monday - Duration::days(7), 10.40),
        (this_monday, 12.48),
    ];

    for (monday, cost) in weeks {
        let at = monday.and_hms_opt(9, 0, 0).unwrap().and_utc();
        governor
            .track(
                &ExecutionReport::new("op", "analysis").with_costs(cost, cost).with_recorded_at(at),
                None,
            )
            .unwrap();
        governor.record_daily(monday).unwrap();
    }

    let trends = governor.analyze_trends(30);
    let weekly: Vec<_> =
        trends.iter().filter(|t| t.period.len() == 10).collect();

    assert_eq!(weekly.len(), 2);
    assert!((weekly[0].cost_change_percent - 4.0).abs() < 1e-9);
    assert_eq!(weekly[0].direction, TrendDirection::Stable);
    assert!((weekly[1].cost_change_percent - 20.0).abs() < 1e-9);
    assert_eq!(weekly[1].direction, TrendDirection::Increasing);
}

#[test]
fn test_violations_survive_restart() {
    let temp_dir = TempDir::new().unwrap();

    {
        let mut governor = open_governor(&temp_dir);
        spend(&governor, 4.2);
        let violations = governor.enforce("analysis").unwrap();
        assert_eq!(violations.len(), 1);
    }

    // A fresh governor over the same data directory sees the violation
    let governor = open_governor(&temp_dir);
    let unresolved = governor.violations(7, Some(false));
    assert_eq!(unresolved.len(), 1);
    assert!(unresolved[0].message.contains("warning"));
}

#[test]
fn test_rules_survive_restart_with_same_ids() {
    let temp_dir = TempDir::new().unwrap();

    let first_ids: Vec<String> = {
        let governor = open_governor(&temp_dir);
        governor.rules().iter().map(|r| r.rule_id.clone()).collect()
    };

    let governor = open_governor(&temp_dir);
    let second_ids: Vec<String> = governor.rules().iter().map(|r| r.rule_id.clone()).collect();
    assert_eq!(first_ids, second_ids);
}
