// crates/decipipe-analytics/src/lib.rs
// ============================================================================
// Crate: decipipe-analytics
// Description: The analytical-store client (C9): three denormalized SQLite
//              tables, each queryable on its own.
// Purpose: Give the processor one upsert call per entity and the query API
//          one read call per supported access pattern, without either
//          needing a join.
// ============================================================================

//! ## Overview
//! A `rusqlite` connection guarded by a lock, schema created idempotently on
//! open, and a `thiserror` error enum distinguishing I/O from database
//! errors. Three flat, typed tables are persisted, each designed for one
//! of the query API's read patterns — every supported query touches
//! exactly one table.
//!
//! `runId`/`stepId`/`(runId,stepId,timestamp,eventId)` primary keys plus
//! `INSERT ... ON CONFLICT ... DO UPDATE` give the "latest-writer-wins by
//! primary key" merge semantics the processor's idempotent replay depends
//! on; there is no separate merge/compaction step because SQLite applies
//! the conflict resolution synchronously on each insert.

mod rows;
mod schema;
mod store;

pub use rows::DecisionEventRow;
pub use rows::RunRow;
pub use rows::StepRow;
pub use store::AnalyticsStore;

/// Errors an [`AnalyticsStore`] operation may return.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// The database connection or a statement failed.
    #[error("analytics store db error: {0}")]
    Db(String),
    /// A stored value could not be interpreted (e.g. an unknown enum
    /// label, or malformed metadata JSON).
    #[error("analytics store data error: {0}")]
    Data(String),
}

impl From<rusqlite::Error> for AnalyticsError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}
