// crates/decipipe-query/src/responses.rs
// ============================================================================
// Module: Response DTOs
// Description: JSON shapes returned by the query API, built from analytical
//              store rows.
// Purpose: Keep `decipipe-analytics`'s row types free of wire concerns;
//          only this crate knows what the HTTP contract looks like.
// ============================================================================

use decipipe_analytics::DecisionEventRow;
use decipipe_analytics::RunRow;
use decipipe_analytics::StepRow;
use decipipe_model::EventId;
use decipipe_model::ItemId;
use decipipe_model::Outcome;
use decipipe_model::PipelineId;
use decipipe_model::RunId;
use decipipe_model::RunStatus;
use decipipe_model::StepId;
use decipipe_model::StepType;
use decipipe_model::Timestamp;
use serde::Serialize;
use serde_json::Value;

/// One row of `GET /runs`, and the top-level shape of `GET /runs/:id`
/// (with `steps` and, if requested, `rawPayload` attached).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: RunId,
    pub pipeline_id: PipelineId,
    pub status: RunStatus,
    pub started_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_steps: u64,
    pub total_input_count: u64,
    pub total_output_count: u64,
    pub overall_elimination_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
}

impl From<RunRow> for RunSummary {
    fn from(row: RunRow) -> Self {
        Self {
            run_id: row.run_id,
            pipeline_id: row.pipeline_id,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
            total_steps: row.total_steps,
            total_input_count: row.total_input_count,
            total_output_count: row.total_output_count,
            overall_elimination_ratio: row.overall_elimination_ratio,
            metadata: row.metadata,
            steps: None,
            raw_payload: None,
        }
    }
}

/// One step as nested under `GET /runs/:id`'s `steps` array.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub step_id: StepId,
    pub run_id: RunId,
    pub pipeline_id: PipelineId,
    pub r#type: StepType,
    pub name: String,
    pub started_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    pub metrics: StepMetricsView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
}

/// The derived-metrics block nested in [`StepSummary`] and
/// `GET /steps/:id/details`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetricsView {
    pub input_count: u64,
    pub output_count: u64,
    pub elimination_ratio: f64,
    pub kept_count: u64,
    pub eliminated_count: u64,
    pub scored_count: u64,
}

impl From<StepRow> for StepSummary {
    fn from(row: StepRow) -> Self {
        Self {
            step_id: row.step_id,
            run_id: row.run_id,
            pipeline_id: row.pipeline_id,
            r#type: row.r#type,
            name: row.name,
            started_at: row.started_at,
            completed_at: row.completed_at,
            metrics: StepMetricsView {
                input_count: row.input_count,
                output_count: row.output_count,
                elimination_ratio: row.elimination_ratio,
                kept_count: row.kept_count,
                eliminated_count: row.eliminated_count,
                scored_count: row.scored_count,
            },
            raw_payload: None,
        }
    }
}

/// `GET /steps/:id/details`'s top-level shape: the step plus its decision
/// references.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDetails {
    #[serde(flatten)]
    pub step: StepSummary,
    pub decisions: Vec<DecisionReference>,
}

/// One decision-event reference under `GET /steps/:id/details`, optionally
/// augmented with the event's full blob payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionReference {
    pub event_id: EventId,
    pub run_id: RunId,
    pub step_id: StepId,
    pub pipeline_id: PipelineId,
    pub outcome: Outcome,
    pub item_id: ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub blob_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
}

impl From<DecisionEventRow> for DecisionReference {
    fn from(row: DecisionEventRow) -> Self {
        Self {
            event_id: row.event_id,
            run_id: row.run_id,
            step_id: row.step_id,
            pipeline_id: row.pipeline_id,
            outcome: row.outcome,
            item_id: row.item_id,
            score: row.score,
            blob_key: row.blob_key,
            raw_payload: None,
        }
    }
}
