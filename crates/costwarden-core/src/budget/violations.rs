//! Ledger of recorded budget violations.

use super::rules::{EnforcementAction, RuleStatus};
use super::store::{ViolationStore, save_or_warn};
use crate::error::{GovernanceError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Kind of rule breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Warning threshold crossed.
    ThresholdExceeded,
    /// Limit crossed.
    LimitExceeded,
    /// Critical threshold crossed.
    Emergency,
}

impl ViolationKind {
    /// Maps a breaching rule status to its violation kind.
    ///
    /// Returns `None` for healthy status.
    pub fn from_status(status: RuleStatus) -> Option<Self> {
        match status {
            RuleStatus::Healthy => None,
            RuleStatus::Warning => Some(ViolationKind::ThresholdExceeded),
            RuleStatus::Exceeded => Some(ViolationKind::LimitExceeded),
            RuleStatus::Critical => Some(ViolationKind::Emergency),
        }
    }

    /// Converts kind to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            ViolationKind::ThresholdExceeded => "threshold_exceeded",
            ViolationKind::LimitExceeded => "limit_exceeded",
            ViolationKind::Emergency => "emergency",
        }
    }
}

/// Record of a budget rule breach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetViolation {
    /// Unique violation ID.
    pub violation_id: String,
    /// ID of the breached rule.
    pub rule_id: String,
    /// When the breach was detected.
    pub timestamp: DateTime<Utc>,
    /// Kind of breach.
    pub kind: ViolationKind,
    /// Cumulative spend at detection time.
    pub current_amount_usd: f64,
    /// The rule's limit.
    pub limit_amount_usd: f64,
    /// Percentage of the limit used.
    pub percentage_used: f64,
    /// Action the rule engine took.
    pub action: EnforcementAction,
    /// Human-readable description.
    pub message: String,
    /// Whether the violation has been resolved.
    pub resolved: bool,
    /// When the violation was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl BudgetViolation {
    /// Creates an unresolved violation with a fresh ID.
    pub fn new(
        rule_id: impl Into<String>,
        kind: ViolationKind,
        current_amount_usd: f64,
        limit_amount_usd: f64,
        percentage_used: f64,
        action: EnforcementAction,
        message: impl Into<String>,
    ) -> Self {
        Self {
            violation_id: format!("violation_{}", Uuid::new_v4().simple()),
            rule_id: rule_id.into(),
            timestamp: Utc::now(),
            kind,
            current_amount_usd,
            limit_amount_usd,
            percentage_used,
            action,
            message: message.into(),
            resolved: false,
            resolved_at: None,
        }
    }
}

/// Violation counts for a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationSummary {
    /// Window length in days.
    pub window_days: u32,
    /// Total violations in the window.
    pub total: u64,
    /// Resolved violations.
    pub resolved: u64,
    /// Unresolved violations.
    pub unresolved: u64,
    /// Fraction resolved; 0 when the window is empty.
    pub resolution_rate: f64,
    /// Counts by violation kind.
    pub by_kind: HashMap<ViolationKind, u64>,
    /// Counts by enforcement action.
    pub by_action: HashMap<EnforcementAction, u64>,
}

/// Append-only record of rule breaches with resolution tracking.
pub struct ViolationLedger {
    violations: Vec<BudgetViolation>,
    store: Box<dyn ViolationStore>,
}

impl ViolationLedger {
    /// Creates a ledger backed by the given store.
    ///
    /// A failed load starts the ledger empty rather than failing; the store
    /// contents are replaced on the next successful save.
    pub fn new(store: Box<dyn ViolationStore>) -> Self {
        let violations = match store.load() {
            Ok(violations) => violations,
            Err(e) => {
                warn!("could not load budget violations, starting empty: {}", e);
                Vec::new()
            }
        };
        Self { violations, store }
    }

    /// Appends a violation and persists.
    pub fn record(&mut self, violation: BudgetViolation) {
        self.violations.push(violation);
        save_or_warn("budget violations", self.store.save(&self.violations));
    }

    /// Violations within the trailing window, optionally filtered by
    /// resolution state.
    pub fn list(&self, window_days: u32, resolved: Option<bool>) -> Vec<BudgetViolation> {
        let cutoff = Utc::now() - Duration::days(i64::from(window_days));
        self.violations
            .iter()
            .filter(|v| v.timestamp > cutoff)
            .filter(|v| resolved.is_none_or(|wanted| v.resolved == wanted))
            .cloned()
            .collect()
    }

    /// Marks a violation resolved, stamping the resolution time.
    ///
    /// Resolving an already-resolved violation is a no-op that preserves the
    /// original resolution timestamp.
    ///
    /// # Errors
    /// Returns `GovernanceError::ViolationNotFound` if the ID is unknown.
    pub fn resolve(&mut self, violation_id: &str) -> Result<()> {
        let violation = self
            .violations
            .iter_mut()
            .find(|v| v.violation_id == violation_id)
            .ok_or_else(|| GovernanceError::ViolationNotFound(violation_id.to_string()))?;

        if violation.resolved {
            return Ok(());
        }

        violation.resolved = true;
        violation.resolved_at = Some(Utc::now());
        save_or_warn("budget violations", self.store.save(&self.violations));
        Ok(())
    }

    /// Counts by kind and action for the trailing window.
    pub fn summarize(&self, window_days: u32) -> ViolationSummary {
        let window = self.list(window_days, None);

        let total = window.len() as u64;
        let resolved = window.iter().filter(|v| v.resolved).count() as u64;

        let mut by_kind: HashMap<ViolationKind, u64> = HashMap::new();
        let mut by_action: HashMap<EnforcementAction, u64> = HashMap::new();
        for violation in &window {
            *by_kind.entry(violation.kind).or_insert(0) += 1;
            *by_action.entry(violation.action).or_insert(0) += 1;
        }

        ViolationSummary {
            window_days,
            total,
            resolved,
            unresolved: total - resolved,
            resolution_rate: if total > 0 { resolved as f64 / total as f64 } else { 0.0 },
            by_kind,
            by_action,
        }
    }

    /// Removes violations older than the retention window.
    pub fn prune(&mut self, days_to_keep: u32) -> usize {
        let cutoff = Utc::now() - Duration::days(i64::from(days_to_keep));
        let before = self.violations.len();
        self.violations.retain(|v| v.timestamp > cutoff);
        let removed = before - self.violations.len();
        if removed > 0 {
            save_or_warn("budget violations", self.store.save(&self.violations));
        }
        removed
    }

    /// All violations currently held.
    pub fn all(&self) -> &[BudgetViolation] {
        &self.violations
    }
}
