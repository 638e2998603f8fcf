// crates/decipipe-analytics/src/rows.rs
// ============================================================================
// Module: Analytical Store Rows
// Description: The query-side shape of each of the three tables.
// Purpose: Give the query API typed rows instead of raw rusqlite rows.
// ============================================================================

use decipipe_model::EventId;
use decipipe_model::ItemId;
use decipipe_model::Outcome;
use decipipe_model::PipelineId;
use decipipe_model::RunId;
use decipipe_model::RunStatus;
use decipipe_model::StepId;
use decipipe_model::StepType;
use decipipe_model::Timestamp;
use serde_json::Value;

/// One row of the `runs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    /// The run's identifier.
    pub run_id: RunId,
    /// The pipeline the run belongs to.
    pub pipeline_id: PipelineId,
    /// The run's lifecycle status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run reached a terminal status, if it has.
    pub completed_at: Option<Timestamp>,
    /// The run's error message, if it failed.
    pub error: Option<String>,
    /// Number of steps folded into `overall_elimination_ratio`.
    pub total_steps: u64,
    /// Sum of every step's `inputCount`.
    pub total_input_count: u64,
    /// Sum of every step's `outputCount`.
    pub total_output_count: u64,
    /// `1 - totalOutputCount / max(totalInputCount, 1)`.
    pub overall_elimination_ratio: f64,
    /// Caller-supplied metadata, echoed from the run snapshot.
    pub metadata: Option<Value>,
}

/// One row of the `steps` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRow {
    /// The step's identifier.
    pub step_id: StepId,
    /// The run the step belongs to.
    pub run_id: RunId,
    /// The pipeline the run belongs to.
    pub pipeline_id: PipelineId,
    /// The kind of node this step represents.
    pub r#type: StepType,
    /// The step's display name.
    pub name: String,
    /// Number of items the step observed.
    pub input_count: u64,
    /// Number of items the step emitted.
    pub output_count: u64,
    /// `1 - outputCount / max(inputCount, 1)`.
    pub elimination_ratio: f64,
    /// Items with outcome `kept`.
    pub kept_count: u64,
    /// Items with outcome `eliminated`.
    pub eliminated_count: u64,
    /// Items with outcome `scored`.
    pub scored_count: u64,
    /// When the step started.
    pub started_at: Timestamp,
    /// When the step finished, if it has.
    pub completed_at: Option<Timestamp>,
}

/// One row of the `decisionEvents` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEventRow {
    /// The run the decision belongs to.
    pub run_id: RunId,
    /// The step the decision was made at.
    pub step_id: StepId,
    /// When the decision was made.
    pub timestamp: Timestamp,
    /// The decision's identifier.
    pub event_id: EventId,
    /// The pipeline the run belongs to.
    pub pipeline_id: PipelineId,
    /// What happened to the item.
    pub outcome: Outcome,
    /// The item's opaque identifier.
    pub item_id: ItemId,
    /// The item's numeric score, present for `outcome == Scored`.
    pub score: Option<f64>,
    /// The blob-store key holding the event's full payload.
    pub blob_key: String,
}
