//! Database schema for the cost ledger.

use crate::error::Result;
use rusqlite::Connection;

/// Initializes the cost ledger schema.
///
/// Creates the `cost_records` table: one immutable row per tracked
/// operation, with cost, resource-volume, and outcome columns.
///
/// # Errors
/// Returns error if schema creation fails
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cost_records (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            operation_type TEXT NOT NULL,
            operation_hash TEXT NOT NULL,
            operation_preview TEXT NOT NULL,
            estimated_cost REAL NOT NULL DEFAULT 0.0,
            actual_cost REAL NOT NULL DEFAULT 0.0,
            cost_difference REAL NOT NULL DEFAULT 0.0,
            execution_time_ms INTEGER NOT NULL DEFAULT 0,
            bytes_processed INTEGER NOT NULL DEFAULT 0,
            slot_ms INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error_message TEXT,
            priority TEXT NOT NULL
        )",
        [],
    )?;

    // Indexes for efficient queries
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cost_records_timestamp
         ON cost_records(timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cost_records_type
         ON cost_records(operation_type)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cost_records_cost
         ON cost_records(actual_cost)",
        [],
    )?;

    Ok(())
}
