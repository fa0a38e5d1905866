//! File-backed repositories for rules, violations, and history records.
//!
//! Load-all/save-all JSON stores behind narrow traits so a database-backed
//! implementation can be substituted without touching engine logic. Writes
//! are atomic: content goes to a uniquely named temp file which is then
//! renamed over the destination.

use super::rules::BudgetRule;
use super::violations::BudgetViolation;
use crate::error::{GovernanceError, Result};
use crate::history::CostHistoryRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Durable store for budget rules.
pub trait RuleStore: Send {
    /// Loads all persisted rules.
    fn load(&self) -> Result<Vec<BudgetRule>>;
    /// Replaces the persisted rule set.
    fn save(&self, rules: &[BudgetRule]) -> Result<()>;
}

/// Durable store for budget violations.
pub trait ViolationStore: Send {
    /// Loads all persisted violations.
    fn load(&self) -> Result<Vec<BudgetViolation>>;
    /// Replaces the persisted violation set.
    fn save(&self, violations: &[BudgetViolation]) -> Result<()>;
}

/// Durable store for daily cost history records.
pub trait HistoryStore: Send {
    /// Loads all persisted daily records.
    fn load(&self) -> Result<Vec<CostHistoryRecord>>;
    /// Replaces the persisted daily records.
    fn save(&self, records: &[CostHistoryRecord]) -> Result<()>;
}

fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let records: Vec<T> = serde_json::from_str(&content).map_err(|e| {
        GovernanceError::Persistence(format!("failed to parse {}: {}", path.display(), e))
    })?;

    debug!(count = records.len(), path = %path.display(), "loaded store");
    Ok(records)
}

fn write_all<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(records).map_err(|e| {
        GovernanceError::Persistence(format!("failed to serialize {}: {}", path.display(), e))
    })?;

    atomic_write(path, &content)
}

/// Write content atomically using the temp file + rename pattern, so a
/// concurrent reader sees either the old file or the new one, never a
/// partial write.
fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let temp_suffix = Uuid::new_v4().to_string();
    let temp_filename = format!(
        "{}.tmp.{}",
        path.file_stem().and_then(|s| s.to_str()).unwrap_or("store"),
        temp_suffix
    );
    let temp_path = path.parent().map_or_else(|| PathBuf::from(&temp_filename), |p| p.join(&temp_filename));

    fs::write(&temp_path, content).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        GovernanceError::Persistence(format!("failed to write temporary file: {}", e))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        GovernanceError::Persistence(format!("failed to atomically rename file: {}", e))
    })?;

    Ok(())
}

/// JSON file store for budget rules.
pub struct JsonRuleStore {
    path: PathBuf,
}

impl JsonRuleStore {
    /// Creates a store at the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RuleStore for JsonRuleStore {
    fn load(&self) -> Result<Vec<BudgetRule>> {
        read_all(&self.path)
    }

    fn save(&self, rules: &[BudgetRule]) -> Result<()> {
        write_all(&self.path, rules)
    }
}

/// JSON file store for budget violations.
pub struct JsonViolationStore {
    path: PathBuf,
}

impl JsonViolationStore {
    /// Creates a store at the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ViolationStore for JsonViolationStore {
    fn load(&self) -> Result<Vec<BudgetViolation>> {
        read_all(&self.path)
    }

    fn save(&self, violations: &[BudgetViolation]) -> Result<()> {
        write_all(&self.path, violations)
    }
}

/// JSON file store for daily cost history records.
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    /// Creates a store at the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HistoryStore for JsonHistoryStore {
    fn load(&self) -> Result<Vec<CostHistoryRecord>> {
        read_all(&self.path)
    }

    fn save(&self, records: &[CostHistoryRecord]) -> Result<()> {
        write_all(&self.path, records)
    }
}

/// Attempt a store save, keeping state in memory on failure.
///
/// Every save writes the full record set, so a failed write is retried
/// implicitly by the next successful one. The failure is surfaced as a
/// warning rather than an error so mutations are never lost silently.
pub(crate) fn save_or_warn<T>(what: &str, result: Result<T>) {
    if let Err(e) = result {
        warn!("could not save {}; keeping changes in memory: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::rules::{BudgetScope, EnforcementLevel, default_rules};
    use tempfile::TempDir;

    #[test]
    fn test_rule_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonRuleStore::new(temp_dir.path().join("budget_rules.json"));

        let rules = default_rules(5.0, 1.0);
        store.save(&rules).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), rules.len());
        assert_eq!(loaded[0].rule_id, rules[0].rule_id);
        assert_eq!(loaded[0].scope, rules[0].scope);
        assert_eq!(loaded[0].enforcement_level, rules[0].enforcement_level);
        assert_eq!(loaded[0].limit_usd, rules[0].limit_usd);
    }

    #[test]
    fn test_enum_fields_serialize_as_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget_rules.json");
        let store = JsonRuleStore::new(&path);

        let rule = crate::budget::rules::BudgetRule::new(
            "test",
            BudgetScope::PerOperation,
            1.0,
            EnforcementLevel::Emergency,
        );
        store.save(std::slice::from_ref(&rule)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"per_operation\""));
        assert!(content.contains("\"emergency\""));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonRuleStore::new(temp_dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("budget_rules.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonRuleStore::new(&path);
        assert!(matches!(store.load(), Err(GovernanceError::Persistence(_))));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("deep").join("rules.json");
        let store = JsonRuleStore::new(&path);

        store.save(&default_rules(5.0, 1.0)).unwrap();
        assert!(path.exists());
    }
}
