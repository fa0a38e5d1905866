//! Append-only ledger of tracked operation costs.

use super::schema::initialize_schema;
use crate::error::{GovernanceError, Result};
use crate::pricing::PricingConfig;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const PREVIEW_CHARS: usize = 100;

/// Outcome of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Operation completed successfully.
    Done,
    /// Operation failed.
    Error,
}

impl RecordStatus {
    /// Converts status to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            RecordStatus::Done => "done",
            RecordStatus::Error => "error",
        }
    }

    /// Parses status from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "done" => Ok(RecordStatus::Done),
            "error" => Ok(RecordStatus::Error),
            _ => Err(GovernanceError::Persistence(format!("unknown record status: {}", s))),
        }
    }
}

/// Priority tag derived from an operation's actual cost relative to the
/// per-operation limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Derives the priority tag for a cost against the per-operation limit.
    ///
    /// At or above the limit the record is critical; 50% of the limit is
    /// high; 20% is medium; anything below is low.
    pub fn from_cost(actual_cost_usd: f64, per_operation_limit_usd: f64) -> Self {
        if actual_cost_usd >= per_operation_limit_usd {
            Priority::Critical
        } else if actual_cost_usd >= per_operation_limit_usd * 0.5 {
            Priority::High
        } else if actual_cost_usd >= per_operation_limit_usd * 0.2 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Converts priority to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Parses priority from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(GovernanceError::Persistence(format!("unknown priority: {}", s))),
        }
    }
}

/// Immutable record of a single tracked operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCostRecord {
    /// Unique record ID.
    pub id: String,
    /// When the operation was tracked.
    pub timestamp: DateTime<Utc>,
    /// Operation category supplied by the caller.
    pub operation_type: String,
    /// SHA-256 fingerprint of the operation text.
    pub operation_hash: String,
    /// Leading characters of the operation text.
    pub operation_preview: String,
    /// Estimated cost in USD.
    pub estimated_cost_usd: f64,
    /// Actual cost in USD.
    pub actual_cost_usd: f64,
    /// Actual minus estimated cost.
    pub cost_difference_usd: f64,
    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Bytes processed.
    pub bytes_processed: u64,
    /// Compute time consumed in slot-milliseconds.
    pub slot_ms: u64,
    /// Operation outcome.
    pub status: RecordStatus,
    /// Error message when the operation failed.
    pub error_message: Option<String>,
    /// Derived priority tag.
    pub priority: Priority,
}

/// Completed-execution report submitted to the ledger.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Full operation text.
    pub operation: String,
    /// Operation category.
    pub operation_type: String,
    /// Estimated cost in USD.
    pub estimated_cost_usd: f64,
    /// Actual cost in USD.
    pub actual_cost_usd: f64,
    /// Bytes the operation processed.
    pub bytes_processed: u64,
    /// Compute time consumed in slot-milliseconds.
    pub slot_ms: u64,
    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Error message when the operation failed.
    pub error_message: Option<String>,
    /// When the execution finished.
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Creates a report for an operation that just finished.
    pub fn new(operation: impl Into<String>, operation_type: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            operation_type: operation_type.into(),
            estimated_cost_usd: 0.0,
            actual_cost_usd: 0.0,
            bytes_processed: 0,
            slot_ms: 0,
            execution_time_ms: 0,
            error_message: None,
            recorded_at: Utc::now(),
        }
    }

    /// Sets estimated and actual costs.
    #[must_use]
    pub fn with_costs(mut self, estimated_usd: f64, actual_usd: f64) -> Self {
        self.estimated_cost_usd = estimated_usd;
        self.actual_cost_usd = actual_usd;
        self
    }

    /// Sets resource usage.
    #[must_use]
    pub fn with_resources(mut self, bytes_processed: u64, slot_ms: u64) -> Self {
        self.bytes_processed = bytes_processed;
        self.slot_ms = slot_ms;
        self
    }

    /// Sets execution time.
    #[must_use]
    pub fn with_execution_time(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }

    /// Marks the operation as failed.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Overrides the record timestamp, for backfill.
    #[must_use]
    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }
}

/// Per-type cost breakdown within a summary window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeBreakdown {
    /// Operation type.
    pub operation_type: String,
    /// Number of operations.
    pub count: u64,
    /// Total actual cost in USD.
    pub total_cost_usd: f64,
    /// Average actual cost in USD.
    pub avg_cost_usd: f64,
}

/// Per-priority cost breakdown within a summary window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    /// Priority tag.
    pub priority: Priority,
    /// Number of operations.
    pub count: u64,
    /// Total actual cost in USD.
    pub total_cost_usd: f64,
}

/// Aggregate ledger statistics for a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Window length in days.
    pub window_days: u32,
    /// Number of tracked operations.
    pub total_operations: u64,
    /// Total actual cost in USD.
    pub total_actual_cost_usd: f64,
    /// Total estimated cost in USD.
    pub total_estimated_cost_usd: f64,
    /// Total actual minus estimated cost.
    pub total_difference_usd: f64,
    /// Estimation accuracy: 1 - |total difference| / total estimated.
    pub cost_accuracy: f64,
    /// Average actual cost per operation.
    pub avg_cost_usd: f64,
    /// Average execution time in milliseconds.
    pub avg_execution_time_ms: f64,
    /// Total bytes processed.
    pub total_bytes_processed: u64,
    /// Breakdown by operation type, most expensive first.
    pub by_type: Vec<TypeBreakdown>,
    /// Breakdown by priority tag.
    pub by_priority: Vec<PriorityBreakdown>,
}

/// Single-day ledger totals, the input to daily history records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBreakdown {
    /// The day.
    pub date: NaiveDate,
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
    /// Average cost per operation.
    pub avg_operation_cost: f64,
    /// Most expensive single operation.
    pub max_operation_cost: f64,
}

/// Append-only cost ledger backed by SQLite.
pub struct CostLedger {
    /// Database connection.
    conn: Connection,
    /// Per-operation limit used to derive priority tags.
    per_operation_limit_usd: f64,
    /// Pricing rates used for cost breakdowns.
    pricing: PricingConfig,
}

impl CostLedger {
    /// Creates a ledger with an in-memory database.
    ///
    /// # Errors
    /// Returns error if database initialization fails
    pub fn new(per_operation_limit_usd: f64, pricing: PricingConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn, per_operation_limit_usd, pricing })
    }

    /// Opens a ledger backed by a database file.
    ///
    /// # Errors
    /// Returns error if database opening or initialization fails
    pub fn open(
        path: impl AsRef<Path>,
        per_operation_limit_usd: f64,
        pricing: PricingConfig,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(Self { conn, per_operation_limit_usd, pricing })
    }

    /// Tracks a completed execution.
    ///
    /// Always produces a record, including for failed operations; failures
    /// carry the error message and an `Error` status.
    ///
    /// # Errors
    /// Returns error if the record cannot be appended
    pub fn track(&self, report: &ExecutionReport) -> Result<QueryCostRecord> {
        let record = Self::build_record(report, self.per_operation_limit_usd);

        self.conn.execute(
            "INSERT INTO cost_records (id, timestamp, operation_type, operation_hash,
                                       operation_preview, estimated_cost, actual_cost,
                                       cost_difference, execution_time_ms, bytes_processed,
                                       slot_ms, status, error_message, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.id,
                record.timestamp.timestamp(),
                record.operation_type,
                record.operation_hash,
                record.operation_preview,
                record.estimated_cost_usd,
                record.actual_cost_usd,
                record.cost_difference_usd,
                record.execution_time_ms,
                record.bytes_processed,
                record.slot_ms,
                record.status.as_str(),
                record.error_message,
                record.priority.as_str(),
            ],
        )?;

        debug!(
            cost_usd = record.actual_cost_usd,
            operation_type = %record.operation_type,
            "tracked operation cost"
        );

        Ok(record)
    }

    fn build_record(report: &ExecutionReport, per_operation_limit_usd: f64) -> QueryCostRecord {
        let preview: String = if report.operation.chars().count() > PREVIEW_CHARS {
            let head: String = report.operation.chars().take(PREVIEW_CHARS).collect();
            format!("{}...", head)
        } else {
            report.operation.clone()
        };

        let mut hasher = Sha256::new();
        hasher.update(report.operation.as_bytes());
        let operation_hash = format!("{:x}", hasher.finalize());

        let status =
            if report.error_message.is_some() { RecordStatus::Error } else { RecordStatus::Done };

        QueryCostRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: report.recorded_at,
            operation_type: report.operation_type.clone(),
            operation_hash,
            operation_preview: preview,
            estimated_cost_usd: report.estimated_cost_usd,
            actual_cost_usd: report.actual_cost_usd,
            cost_difference_usd: report.actual_cost_usd - report.estimated_cost_usd,
            execution_time_ms: report.execution_time_ms,
            bytes_processed: report.bytes_processed,
            slot_ms: report.slot_ms,
            status,
            error_message: report.error_message.clone(),
            priority: Priority::from_cost(report.actual_cost_usd, per_operation_limit_usd),
        }
    }

    /// Aggregate statistics for the trailing window.
    ///
    /// # Errors
    /// Returns error if the query fails
    pub fn summary(&self, window_days: u32) -> Result<LedgerSummary> {
        let start = Utc::now().timestamp() - i64::from(window_days) * 86400;

        let (count, actual, estimated, difference, avg_time, bytes) = self.conn.query_row(
            "SELECT COUNT(*), SUM(actual_cost), SUM(estimated_cost), SUM(cost_difference),
                    AVG(execution_time_ms), SUM(bytes_processed)
             FROM cost_records
             WHERE timestamp >= ?1",
            params![start],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    row.get::<_, Option<u64>>(5)?.unwrap_or(0),
                ))
            },
        )?;

        let cost_accuracy =
            if estimated > 0.0 { 1.0 - (difference.abs() / estimated) } else { 0.0 };
        let avg_cost = if count > 0 { actual / count as f64 } else { 0.0 };

        let mut stmt = self.conn.prepare(
            "SELECT operation_type, COUNT(*), SUM(actual_cost)
             FROM cost_records
             WHERE timestamp >= ?1
             GROUP BY operation_type
             ORDER BY SUM(actual_cost) DESC",
        )?;
        let by_type = stmt
            .query_map(params![start], |row| {
                let count: u64 = row.get(1)?;
                let total: f64 = row.get::<_, Option<f64>>(2)?.unwrap_or(0.0);
                Ok(TypeBreakdown {
                    operation_type: row.get(0)?,
                    count,
                    total_cost_usd: total,
                    avg_cost_usd: if count > 0 { total / count as f64 } else { 0.0 },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT priority, COUNT(*), SUM(actual_cost)
             FROM cost_records
             WHERE timestamp >= ?1
             GROUP BY priority
             ORDER BY SUM(actual_cost) DESC",
        )?;
        let by_priority = stmt
            .query_map(params![start], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(priority, count, total_cost_usd)| {
                Ok(PriorityBreakdown { priority: Priority::parse(&priority)?, count, total_cost_usd })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LedgerSummary {
            window_days,
            total_operations: count,
            total_actual_cost_usd: actual,
            total_estimated_cost_usd: estimated,
            total_difference_usd: difference,
            cost_accuracy,
            avg_cost_usd: avg_cost,
            avg_execution_time_ms: avg_time,
            total_bytes_processed: bytes,
            by_type,
            by_priority,
        })
    }

    /// Top-N most expensive records in the trailing window.
    ///
    /// Ordered by actual cost descending; ties broken by earlier timestamp.
    ///
    /// # Errors
    /// Returns error if the query fails
    pub fn expensive(&self, limit: usize, window_days: u32) -> Result<Vec<QueryCostRecord>> {
        let start = Utc::now().timestamp() - i64::from(window_days) * 86400;

        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, operation_type, operation_hash, operation_preview,
                    estimated_cost, actual_cost, cost_difference, execution_time_ms,
                    bytes_processed, slot_ms, status, error_message, priority
             FROM cost_records
             WHERE timestamp >= ?1
             ORDER BY actual_cost DESC, timestamp ASC
             LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![start, limit as i64], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Total actual spend between two timestamps (Unix epoch seconds).
    ///
    /// # Errors
    /// Returns error if the query fails
    pub fn spend_between(&self, start: i64, end: i64) -> Result<f64> {
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(actual_cost) FROM cost_records WHERE timestamp >= ?1 AND timestamp < ?2",
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    /// Single-day totals for the history aggregator.
    ///
    /// # Errors
    /// Returns error if the query fails
    pub fn daily_breakdown(&self, date: NaiveDate) -> Result<DailyBreakdown> {
        let start = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()).unwrap_or(0);
        let end = start + 86400;

        let (total, bytes, slot_ms, count, success, max_cost) = self.conn.query_row(
            "SELECT SUM(actual_cost), SUM(bytes_processed), SUM(slot_ms), COUNT(*),
                    SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), MAX(actual_cost)
             FROM cost_records
             WHERE timestamp >= ?1 AND timestamp < ?2",
            params![start, end],
            |row| {
                Ok((
                    row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    row.get::<_, Option<u64>>(1)?.unwrap_or(0),
                    row.get::<_, Option<u64>>(2)?.unwrap_or(0),
                    row.get::<_, u64>(3)?,
                    row.get::<_, Option<u64>>(4)?.unwrap_or(0),
                    row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                ))
            },
        )?;

        Ok(DailyBreakdown {
            date,
            total_cost_usd: total,
            data_processing_cost: self.pricing.data_cost(bytes),
            compute_cost: self.pricing.compute_cost(slot_ms),
            bytes_processed: bytes,
            slot_ms,
            total_operations: count,
            successful_operations: success,
            failed_operations: count - success,
            avg_operation_cost: if count > 0 { total / count as f64 } else { 0.0 },
            max_operation_cost: max_cost,
        })
    }

    /// Deletes records older than the retention window.
    ///
    /// # Errors
    /// Returns error if the delete fails
    pub fn prune(&self, days_to_keep: u32) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - i64::from(days_to_keep) * 86400;
        let removed =
            self.conn.execute("DELETE FROM cost_records WHERE timestamp < ?1", params![cutoff])?;
        if removed > 0 {
            debug!(removed, "pruned old ledger records");
        }
        Ok(removed)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueryCostRecord> {
    let timestamp: i64 = row.get(1)?;
    let status: String = row.get(11)?;
    let priority: String = row.get(13)?;

    Ok(QueryCostRecord {
        id: row.get(0)?,
        timestamp: DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now),
        operation_type: row.get(2)?,
        operation_hash: row.get(3)?,
        operation_preview: row.get(4)?,
        estimated_cost_usd: row.get(5)?,
        actual_cost_usd: row.get(6)?,
        cost_difference_usd: row.get(7)?,
        execution_time_ms: row.get(8)?,
        bytes_processed: row.get(9)?,
        slot_ms: row.get(10)?,
        status: RecordStatus::parse(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?,
        error_message: row.get(12)?,
        priority: Priority::parse(&priority).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e))
        })?,
    })
}
