// crates/decipipe-analytics/src/store.rs
// ============================================================================
// Module: Analytical Store
// Description: Upsert and query methods over the three tables.
// Purpose: The processor's write path and the query API's read path, both
//          behind one handle.
// Dependencies: rusqlite, parking_lot, decipipe-model
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use decipipe_model::DecisionEvent;
use decipipe_model::EventId;
use decipipe_model::ItemId;
use decipipe_model::PipelineId;
use decipipe_model::Run;
use decipipe_model::RunId;
use decipipe_model::RunStatus;
use decipipe_model::Step;
use decipipe_model::StepId;
use decipipe_model::StepType;
use decipipe_model::Timestamp;
use decipipe_model::elimination_ratio;
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde_json::Value;

use crate::AnalyticsError;
use crate::rows::DecisionEventRow;
use crate::rows::RunRow;
use crate::rows::StepRow;
use crate::schema;

/// The analytical-store client (C9): a SQLite connection plus the
/// upsert/query methods built on top of it.
///
/// # Invariants
/// - Every public method either fully commits or returns an error; no
///   partial-row writes are observable.
pub struct AnalyticsStore {
    connection: Mutex<Connection>,
}

impl AnalyticsStore {
    /// Opens (creating if absent) the SQLite database at `path` and
    /// ensures its schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let connection = Connection::open(path)?;
        schema::initialize(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Opens an in-memory store, used by tests and local dev runs.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, AnalyticsError> {
        let connection = Connection::open_in_memory()?;
        schema::initialize(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Upserts a run snapshot. When the run is terminal, `steps` supplies
    /// every cached step belonging to it so the aggregate counts can be
    /// folded.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure.
    pub fn upsert_run(&self, run: &Run, steps: &[StepRow]) -> Result<(), AnalyticsError> {
        let aggregate = steps.iter().fold((0u64, 0u64, 0u64), |(count, input, output), step| {
            (count + 1, input + step.input_count, output + step.output_count)
        });
        let (total_steps, total_input_count, total_output_count) = aggregate;
        let overall_elimination_ratio = if run.status.is_terminal() {
            elimination_ratio(total_input_count, total_output_count)
        } else {
            0.0
        };
        let metadata = run.metadata.as_ref().map(metadata_to_json);
        let connection = self.connection.lock();
        connection.execute(
            "INSERT INTO runs (
                run_id, pipeline_id, status, started_at, completed_at, error,
                total_steps, total_input_count, total_output_count,
                overall_elimination_ratio, metadata, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(run_id) DO UPDATE SET
                pipeline_id = excluded.pipeline_id,
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                error = excluded.error,
                total_steps = excluded.total_steps,
                total_input_count = excluded.total_input_count,
                total_output_count = excluded.total_output_count,
                overall_elimination_ratio = excluded.overall_elimination_ratio,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= runs.updated_at",
            params![
                run.run_id.as_str(),
                run.pipeline_id.as_str(),
                run.status.as_str(),
                run.started_at.as_unix_millis(),
                run.completed_at.map(|ts| ts.as_unix_millis()),
                run.error,
                total_steps,
                total_input_count,
                total_output_count,
                overall_elimination_ratio,
                metadata.as_ref().map(Value::to_string),
                Timestamp::now().as_unix_millis(),
            ],
        )?;
        Ok(())
    }

    /// Upserts a step snapshot. When `step.completed_at` is set, `events`
    /// supplies the per-step decision events captured so far so
    /// outcome/score counts can be folded.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure.
    pub fn upsert_step(&self, step: &Step, events: &[DecisionEvent]) -> Result<(), AnalyticsError> {
        let metrics = if step.completed_at.is_some() {
            fold_step_metrics(step, events)
        } else {
            decipipe_model::StepMetrics::zero()
        };
        let connection = self.connection.lock();
        connection.execute(
            "INSERT INTO steps (
                step_id, run_id, pipeline_id, type, name,
                input_count, output_count, elimination_ratio,
                kept_count, eliminated_count, scored_count,
                started_at, completed_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(step_id, run_id) DO UPDATE SET
                pipeline_id = excluded.pipeline_id,
                type = excluded.type,
                name = excluded.name,
                input_count = excluded.input_count,
                output_count = excluded.output_count,
                elimination_ratio = excluded.elimination_ratio,
                kept_count = excluded.kept_count,
                eliminated_count = excluded.eliminated_count,
                scored_count = excluded.scored_count,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= steps.updated_at",
            params![
                step.step_id.as_str(),
                step.run_id.as_str(),
                step.pipeline_id.as_str(),
                step.r#type.as_str(),
                step.name,
                metrics.input_count,
                metrics.output_count,
                metrics.elimination_ratio(),
                metrics.kept_count,
                metrics.eliminated_count,
                metrics.scored_count,
                step.started_at.as_unix_millis(),
                step.completed_at.map(|ts| ts.as_unix_millis()),
                Timestamp::now().as_unix_millis(),
            ],
        )?;
        Ok(())
    }

    /// Inserts (or replaces, if re-delivered) one decision-event row.
    ///
    /// `pipeline_id` is supplied by the caller (the processor resolves it
    /// from its in-memory step cache) rather than read off the event
    /// itself, since [`DecisionEvent`] carries no `pipeline_id` field of
    /// its own — only its owning step and run do.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure.
    pub fn insert_decision_event(
        &self,
        event: &DecisionEvent,
        pipeline_id: &PipelineId,
        blob_key: &str,
    ) -> Result<(), AnalyticsError> {
        let connection = self.connection.lock();
        connection.execute(
            "INSERT INTO decision_events (
                run_id, step_id, timestamp, event_id, pipeline_id,
                outcome, item_id, score, blob_key, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(run_id, step_id, timestamp, event_id) DO UPDATE SET
                pipeline_id = excluded.pipeline_id,
                outcome = excluded.outcome,
                item_id = excluded.item_id,
                score = excluded.score,
                blob_key = excluded.blob_key,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= decision_events.updated_at",
            params![
                event.run_id.as_str(),
                event.step_id.as_str(),
                event.timestamp.as_unix_millis(),
                event.event_id.as_str(),
                pipeline_id.as_str(),
                event.outcome.as_str(),
                event.item_id.as_str(),
                event.score,
                blob_key,
                Timestamp::now().as_unix_millis(),
            ],
        )?;
        Ok(())
    }

    /// Lists runs ordered by `startedAt` descending, optionally restricted
    /// to the "bad" predicate: `eliminationRatio > 0.8 OR status = 'failed'
    /// OR error IS NOT NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure or an unrecognized
    /// stored status label.
    pub fn list_runs(&self, bad_filter: bool, limit: u32, offset: u32) -> Result<Vec<RunRow>, AnalyticsError> {
        let connection = self.connection.lock();
        let predicate = if bad_filter {
            "WHERE overall_elimination_ratio > 0.8 OR status = 'failed' OR error IS NOT NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT run_id, pipeline_id, status, started_at, completed_at, error,
                    total_steps, total_input_count, total_output_count,
                    overall_elimination_ratio, metadata
             FROM runs {predicate}
             ORDER BY started_at DESC
             LIMIT ?1 OFFSET ?2"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement
            .query_map(params![limit, offset], run_row_from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|row| row.map_err(AnalyticsError::Data)).collect()
    }

    /// Looks up one run by id.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure or an unrecognized
    /// stored status label.
    pub fn get_run(&self, run_id: &RunId) -> Result<Option<RunRow>, AnalyticsError> {
        let connection = self.connection.lock();
        let row = connection
            .query_row(
                "SELECT run_id, pipeline_id, status, started_at, completed_at, error,
                        total_steps, total_input_count, total_output_count,
                        overall_elimination_ratio, metadata
                 FROM runs WHERE run_id = ?1",
                params![run_id.as_str()],
                run_row_from_sql,
            )
            .optional()?;
        row.transpose().map_err(AnalyticsError::Data)
    }

    /// Lists every step belonging to `run_id`, ordered by `startedAt`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure or an unrecognized
    /// stored type label.
    pub fn list_steps_by_run(&self, run_id: &RunId) -> Result<Vec<StepRow>, AnalyticsError> {
        let connection = self.connection.lock();
        let mut statement = connection.prepare(
            "SELECT step_id, run_id, pipeline_id, type, name,
                    input_count, output_count, elimination_ratio,
                    kept_count, eliminated_count, scored_count,
                    started_at, completed_at
             FROM steps WHERE run_id = ?1 ORDER BY started_at ASC",
        )?;
        let rows = statement
            .query_map(params![run_id.as_str()], step_row_from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|row| row.map_err(AnalyticsError::Data)).collect()
    }

    /// Looks up one step by id.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure or an unrecognized
    /// stored type label.
    pub fn get_step(&self, step_id: &StepId) -> Result<Option<StepRow>, AnalyticsError> {
        let connection = self.connection.lock();
        let row = connection
            .query_row(
                "SELECT step_id, run_id, pipeline_id, type, name,
                        input_count, output_count, elimination_ratio,
                        kept_count, eliminated_count, scored_count,
                        started_at, completed_at
                 FROM steps WHERE step_id = ?1 LIMIT 1",
                params![step_id.as_str()],
                step_row_from_sql,
            )
            .optional()?;
        row.transpose().map_err(AnalyticsError::Data)
    }

    /// Lists up to `limit` decision events for `step_id`, ordered by
    /// `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure or an unrecognized
    /// stored outcome label.
    pub fn list_decision_events_by_step(
        &self,
        step_id: &StepId,
        limit: u32,
    ) -> Result<Vec<DecisionEventRow>, AnalyticsError> {
        let connection = self.connection.lock();
        let mut statement = connection.prepare(
            "SELECT run_id, step_id, timestamp, event_id, pipeline_id, outcome, item_id, score, blob_key
             FROM decision_events WHERE step_id = ?1 ORDER BY timestamp ASC LIMIT ?2",
        )?;
        let rows = statement
            .query_map(params![step_id.as_str(), limit], decision_event_row_from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|row| row.map_err(AnalyticsError::Data)).collect()
    }

    /// Lists every decision event for `(run_id, item_id)`, the item's full
    /// trajectory through the pipeline, ordered by `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] on a database failure or an unrecognized
    /// stored outcome label.
    pub fn list_decision_events_by_item(
        &self,
        run_id: &RunId,
        item_id: &ItemId,
    ) -> Result<Vec<DecisionEventRow>, AnalyticsError> {
        let connection = self.connection.lock();
        let mut statement = connection.prepare(
            "SELECT run_id, step_id, timestamp, event_id, pipeline_id, outcome, item_id, score, blob_key
             FROM decision_events WHERE run_id = ?1 AND item_id = ?2 ORDER BY timestamp ASC",
        )?;
        let rows = statement
            .query_map(params![run_id.as_str(), item_id.as_str()], decision_event_row_from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|row| row.map_err(AnalyticsError::Data)).collect()
    }
}

fn fold_step_metrics(step: &Step, events: &[DecisionEvent]) -> decipipe_model::StepMetrics {
    let kept_count = events.iter().filter(|event| event.outcome == decipipe_model::Outcome::Kept).count() as u64;
    let eliminated_count = events
        .iter()
        .filter(|event| event.outcome == decipipe_model::Outcome::Eliminated)
        .count() as u64;
    let scored_count = events.iter().filter(|event| event.outcome == decipipe_model::Outcome::Scored).count() as u64;

    let input_count = step
        .configured_input_count()
        .or_else(|| events.first().and_then(event_metadata_input_count))
        .unwrap_or(events.len() as u64);
    let output_count = events
        .first()
        .and_then(event_metadata_output_count)
        .unwrap_or(kept_count + scored_count);

    decipipe_model::StepMetrics {
        input_count,
        output_count,
        kept_count,
        eliminated_count,
        scored_count,
    }
}

fn event_metadata_input_count(event: &DecisionEvent) -> Option<u64> {
    event.metadata.as_ref().and_then(|metadata| metadata.get("inputCount")).and_then(Value::as_u64)
}

fn event_metadata_output_count(event: &DecisionEvent) -> Option<u64> {
    event.metadata.as_ref().and_then(|metadata| metadata.get("outputCount")).and_then(Value::as_u64)
}

fn metadata_to_json(metadata: &BTreeMap<String, Value>) -> Value {
    Value::Object(metadata.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
}

fn run_row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<RunRow, String>> {
    let status_label: String = row.get(2)?;
    let Ok(status) = RunStatus::from_str(&status_label) else {
        return Ok(Err(format!("unknown run status `{status_label}`")));
    };
    let metadata_json: Option<String> = row.get(10)?;
    let metadata = match metadata_json.map(|text| serde_json::from_str(&text)) {
        Some(Ok(value)) => Some(value),
        Some(Err(err)) => return Ok(Err(format!("malformed run metadata: {err}"))),
        None => None,
    };
    Ok(Ok(RunRow {
        run_id: RunId::new(row.get::<_, String>(0)?),
        pipeline_id: PipelineId::new(row.get::<_, String>(1)?),
        status,
        started_at: Timestamp::from_unix_millis(row.get(3)?),
        completed_at: row.get::<_, Option<i64>>(4)?.map(Timestamp::from_unix_millis),
        error: row.get(5)?,
        total_steps: row.get::<_, i64>(6)? as u64,
        total_input_count: row.get::<_, i64>(7)? as u64,
        total_output_count: row.get::<_, i64>(8)? as u64,
        overall_elimination_ratio: row.get(9)?,
        metadata,
    }))
}

fn step_row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<StepRow, String>> {
    let type_label: String = row.get(3)?;
    let Ok(r#type) = StepType::from_str(&type_label) else {
        return Ok(Err(format!("unknown step type `{type_label}`")));
    };
    Ok(Ok(StepRow {
        step_id: StepId::new(row.get::<_, String>(0)?),
        run_id: RunId::new(row.get::<_, String>(1)?),
        pipeline_id: PipelineId::new(row.get::<_, String>(2)?),
        r#type,
        name: row.get(4)?,
        input_count: row.get::<_, i64>(5)? as u64,
        output_count: row.get::<_, i64>(6)? as u64,
        elimination_ratio: row.get(7)?,
        kept_count: row.get::<_, i64>(8)? as u64,
        eliminated_count: row.get::<_, i64>(9)? as u64,
        scored_count: row.get::<_, i64>(10)? as u64,
        started_at: Timestamp::from_unix_millis(row.get(11)?),
        completed_at: row.get::<_, Option<i64>>(12)?.map(Timestamp::from_unix_millis),
    }))
}

fn decision_event_row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<DecisionEventRow, String>> {
    let outcome_label: String = row.get(5)?;
    let Ok(outcome) = decipipe_model::Outcome::from_str(&outcome_label) else {
        return Ok(Err(format!("unknown decision outcome `{outcome_label}`")));
    };
    Ok(Ok(DecisionEventRow {
        run_id: RunId::new(row.get::<_, String>(0)?),
        step_id: StepId::new(row.get::<_, String>(1)?),
        timestamp: Timestamp::from_unix_millis(row.get(2)?),
        event_id: EventId::new(row.get::<_, String>(3)?),
        pipeline_id: PipelineId::new(row.get::<_, String>(4)?),
        outcome,
        item_id: ItemId::new(row.get::<_, String>(6)?),
        score: row.get(7)?,
        blob_key: row.get(8)?,
    }))
}
