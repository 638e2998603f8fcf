// crates/decipipe-analytics/src/schema.rs
// ============================================================================
// Module: Analytical Store Schema
// Description: DDL for the three denormalized tables.
// Purpose: Idempotent schema creation run once per connection open.
// ============================================================================

//! ## Overview
//! `partitionMonth` is a generated column (`YYYY-MM` of the row's primary
//! date field) rather than a value the caller supplies, so it can never
//! drift from the timestamp it is derived from. It exists for cheap
//! range-pruning on the column operators actually filter by.

use rusqlite::Connection;

use crate::AnalyticsError;

pub(crate) fn initialize(connection: &Connection) -> Result<(), AnalyticsError> {
    connection.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS runs (
            run_id                      TEXT PRIMARY KEY,
            pipeline_id                 TEXT NOT NULL,
            status                      TEXT NOT NULL,
            started_at                  INTEGER NOT NULL,
            completed_at                INTEGER,
            error                       TEXT,
            total_steps                 INTEGER NOT NULL DEFAULT 0,
            total_input_count           INTEGER NOT NULL DEFAULT 0,
            total_output_count          INTEGER NOT NULL DEFAULT 0,
            overall_elimination_ratio   REAL NOT NULL DEFAULT 0.0,
            metadata                    TEXT,
            partition_month             TEXT GENERATED ALWAYS AS (
                strftime('%Y-%m', started_at / 1000, 'unixepoch')
            ) VIRTUAL,
            updated_at                  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs (started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_runs_partition_month ON runs (partition_month);

        CREATE TABLE IF NOT EXISTS steps (
            step_id                     TEXT NOT NULL,
            run_id                      TEXT NOT NULL,
            pipeline_id                 TEXT NOT NULL,
            type                        TEXT NOT NULL,
            name                        TEXT NOT NULL,
            input_count                 INTEGER NOT NULL DEFAULT 0,
            output_count                INTEGER NOT NULL DEFAULT 0,
            elimination_ratio           REAL NOT NULL DEFAULT 0.0,
            kept_count                  INTEGER NOT NULL DEFAULT 0,
            eliminated_count            INTEGER NOT NULL DEFAULT 0,
            scored_count                INTEGER NOT NULL DEFAULT 0,
            started_at                  INTEGER NOT NULL,
            completed_at                INTEGER,
            partition_month             TEXT GENERATED ALWAYS AS (
                strftime('%Y-%m', started_at / 1000, 'unixepoch')
            ) VIRTUAL,
            updated_at                  INTEGER NOT NULL,
            PRIMARY KEY (step_id, run_id)
        );
        CREATE INDEX IF NOT EXISTS idx_steps_run_id ON steps (run_id);

        CREATE TABLE IF NOT EXISTS decision_events (
            run_id                      TEXT NOT NULL,
            step_id                     TEXT NOT NULL,
            timestamp                   INTEGER NOT NULL,
            event_id                    TEXT NOT NULL,
            pipeline_id                 TEXT NOT NULL,
            outcome                     TEXT NOT NULL,
            item_id                     TEXT NOT NULL,
            score                       REAL,
            blob_key                    TEXT NOT NULL,
            partition_month             TEXT GENERATED ALWAYS AS (
                strftime('%Y-%m', timestamp / 1000, 'unixepoch')
            ) VIRTUAL,
            updated_at                  INTEGER NOT NULL,
            PRIMARY KEY (run_id, step_id, timestamp, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_decision_events_step_id ON decision_events (step_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_decision_events_item ON decision_events (run_id, item_id);
        ",
    )?;
    Ok(())
}
