// crates/decipipe-model/src/aggregates.rs
// ============================================================================
// Module: Derived Aggregates
// Description: Per-step and per-run metric rollups.
// Purpose: Single definition of elimination ratio shared by the processor
//          and the query API so the two never drift.
// Dependencies: none
// ============================================================================

//! ## Overview
//! `eliminationRatio = 1 - outputCount / max(inputCount, 1)`, clamped to
//! `[0, 1]` and defined to be `0` when `inputCount == 0`.

use serde::Deserialize;
use serde::Serialize;

use crate::ids::PipelineId;
use crate::ids::RunId;
use crate::ids::StepId;

/// Computes the elimination ratio for one step or run.
///
/// # Invariants
/// - Returns `0.0` when `input_count == 0`.
/// - Always in `[0.0, 1.0]`.
#[must_use]
pub fn elimination_ratio(input_count: u64, output_count: u64) -> f64 {
    if input_count == 0 {
        return 0.0;
    }
    let ratio = 1.0 - (output_count as f64) / (input_count.max(1) as f64);
    ratio.clamp(0.0, 1.0)
}

/// Per-step derived metrics, inserted once a step completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetrics {
    /// Number of items the step observed.
    pub input_count: u64,
    /// Number of items the step emitted.
    pub output_count: u64,
    /// Items with outcome `kept`.
    pub kept_count: u64,
    /// Items with outcome `eliminated`.
    pub eliminated_count: u64,
    /// Items with outcome `scored`.
    pub scored_count: u64,
}

impl StepMetrics {
    /// Zero-valued metrics, used for steps with no observed items.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            input_count: 0,
            output_count: 0,
            kept_count: 0,
            eliminated_count: 0,
            scored_count: 0,
        }
    }

    /// The step's elimination ratio.
    #[must_use]
    pub fn elimination_ratio(&self) -> f64 {
        elimination_ratio(self.input_count, self.output_count)
    }
}

/// A [`StepMetrics`] row with the identifiers needed to insert it.
#[derive(Debug, Clone)]
pub struct StepMetricsRow {
    /// The step the metrics belong to.
    pub step_id: StepId,
    /// The run the step belongs to.
    pub run_id: RunId,
    /// The pipeline the run belongs to.
    pub pipeline_id: PipelineId,
    /// The derived metrics.
    pub metrics: StepMetrics,
}

/// Per-run derived metrics, inserted once a run reaches a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    /// Number of steps observed in the run.
    pub total_steps: u64,
    /// Sum of each step's `inputCount`.
    pub total_input_count: u64,
    /// Sum of each step's `outputCount`.
    pub total_output_count: u64,
}

impl RunMetrics {
    /// Folds one step's metrics into the running total.
    #[must_use]
    pub fn fold(mut self, step: StepMetrics) -> Self {
        self.total_steps += 1;
        self.total_input_count += step.input_count;
        self.total_output_count += step.output_count;
        self
    }

    /// Zero-valued metrics, the fold's starting point.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            total_steps: 0,
            total_input_count: 0,
            total_output_count: 0,
        }
    }

    /// The run's overall elimination ratio, computed from summed step
    /// counts.
    #[must_use]
    pub fn overall_elimination_ratio(&self) -> f64 {
        elimination_ratio(self.total_input_count, self.total_output_count)
    }
}
