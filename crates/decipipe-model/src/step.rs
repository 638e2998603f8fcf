// crates/decipipe-model/src/step.rs
// ============================================================================
// Module: Step
// Description: One node within a run.
// Purpose: Canonical wire/storage shape for steps.
// Dependencies: serde_json, crate::ids, crate::status, crate::timestamp
// ============================================================================

//! ## Overview
//! A [`Step`] is created on step entry and has `completed_at` set on step
//! exit regardless of whether the wrapped function succeeded or raised.
//! Steps of the same [`StepType`] may repeat within a run; they are
//! distinguished by `step_id`, not by type+name.
//!
//! `run_id` is a first-class schema field here rather than an
//! out-of-band association: it is the authoritative run association for
//! a step.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::PipelineId;
use crate::ids::RunId;
use crate::ids::StepId;
use crate::status::StepType;
use crate::timestamp::Timestamp;

/// One node within a run.
///
/// # Invariants
/// - `run_id` always names an existing run; this is the authoritative
///   step-to-run association.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Step {
    /// Opaque unique step identifier.
    pub step_id: StepId,
    /// The run this step belongs to.
    pub run_id: RunId,
    /// The pipeline this step's run belongs to, denormalized for
    /// single-table queries.
    pub pipeline_id: PipelineId,
    /// The kind of node this step represents.
    pub r#type: StepType,
    /// Human-readable display name.
    pub name: String,
    /// Opaque configuration knobs (e.g. thresholds), echoed into decision
    /// events so queries can correlate behavior to configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, Value>>,
    /// Time the step was entered.
    pub started_at: Timestamp,
    /// Time the step was exited, set regardless of success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl Step {
    /// Creates a new step on entry.
    #[must_use]
    pub fn start(
        step_id: StepId,
        run_id: RunId,
        pipeline_id: PipelineId,
        r#type: StepType,
        name: impl Into<String>,
        config: Option<BTreeMap<String, Value>>,
        started_at: Timestamp,
    ) -> Self {
        Self {
            step_id,
            run_id,
            pipeline_id,
            r#type,
            name: name.into(),
            config,
            started_at,
            completed_at: None,
        }
    }

    /// Reads `config.inputCount` if present and numeric, used by the
    /// processor's `inputCount` precedence chain (configured > metadata >
    /// event-list length).
    #[must_use]
    pub fn configured_input_count(&self) -> Option<u64> {
        self.config
            .as_ref()
            .and_then(|config| config.get("inputCount"))
            .and_then(Value::as_u64)
    }

    /// Marks the step as exited, regardless of the wrapped function's
    /// outcome.
    pub fn complete(&mut self, completed_at: Timestamp) {
        self.completed_at = Some(completed_at);
    }

    /// Returns the `steps/YYYY/MM/DD/<stepId>.json` blob key for this step,
    /// partitioned by the date it started.
    #[must_use]
    pub fn blob_key(&self) -> String {
        let (year, month, day) = self.started_at.date_parts();
        format!("steps/{year:04}/{month:02}/{day:02}/{}.json", self.step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_key_is_date_partitioned() {
        let step = Step::start(
            StepId::new("step-1"),
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            StepType::Filter,
            "filter",
            None,
            Timestamp::from_unix_millis(1_700_000_000_000),
        );
        assert!(step.blob_key().starts_with("steps/2023/11/"));
        assert!(step.blob_key().ends_with("step-1.json"));
    }
}
