// crates/decipipe-model/src/run.rs
// ============================================================================
// Module: Run
// Description: One pipeline execution.
// Purpose: Canonical wire/storage shape for runs, plus the invariant checks
//          every layer of the pipeline relies on.
// Dependencies: serde_json, crate::ids, crate::status, crate::timestamp
// ============================================================================

//! ## Overview
//! A [`Run`] is created by the capture façade in `status = running` and
//! mutated only by that façade on termination. The processor independently
//! recreates runs from ingested envelopes; its cache is keyed by `run_id`
//! and is not the source of truth for client-side mutation.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::PipelineId;
use crate::ids::RunId;
use crate::status::RunStatus;
use crate::timestamp::Timestamp;

/// One pipeline execution.
///
/// # Invariants
/// - `completed_at >= started_at` when `completed_at` is `Some`.
/// - `error.is_some() <=> status == RunStatus::Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Run {
    /// Opaque unique run identifier.
    pub run_id: RunId,
    /// Opaque pipeline identifier.
    pub pipeline_id: PipelineId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Opaque input payload supplied to the pipeline.
    pub input: Value,
    /// Opaque output payload, present once the run is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Time the run entered `running`.
    pub started_at: Timestamp,
    /// Time the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Error message, present iff `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque string-keyed metadata supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// A [`Run`] fails its documented invariants.
#[derive(Debug, thiserror::Error)]
pub enum RunInvariantError {
    /// `completed_at` precedes `started_at`.
    #[error("run {run_id}: completed_at precedes started_at")]
    CompletedBeforeStarted {
        /// The offending run's identifier.
        run_id: RunId,
    },
    /// `error` and `status` disagree about failure.
    #[error("run {run_id}: error presence does not match status {status:?}")]
    ErrorStatusMismatch {
        /// The offending run's identifier.
        run_id: RunId,
        /// The run's reported status.
        status: RunStatus,
    },
}

impl Run {
    /// Creates a new run in `status = running`, starting now (as supplied
    /// by the caller via `started_at`, since this crate never reads the
    /// wall clock directly).
    #[must_use]
    pub fn start(
        run_id: RunId,
        pipeline_id: PipelineId,
        input: Value,
        started_at: Timestamp,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Self {
        Self {
            run_id,
            pipeline_id,
            status: RunStatus::Running,
            input,
            output: None,
            started_at,
            completed_at: None,
            error: None,
            metadata,
        }
    }

    /// Transitions the run to a terminal status, recording `output` and/or
    /// `error`.
    pub fn end(&mut self, completed_at: Timestamp, output: Option<Value>, error: Option<String>) {
        self.status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.completed_at = Some(completed_at);
        self.output = output;
        self.error = error;
    }

    /// Returns the `runs/YYYY/MM/DD/<runId>.json` blob key for this run,
    /// partitioned by the date it started.
    #[must_use]
    pub fn blob_key(&self) -> String {
        let (year, month, day) = self.started_at.date_parts();
        format!("runs/{year:04}/{month:02}/{day:02}/{}.json", self.run_id)
    }

    /// Validates the two documented invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RunInvariantError`] when either invariant is violated.
    pub fn check_invariants(&self) -> Result<(), RunInvariantError> {
        if let Some(completed_at) = self.completed_at
            && completed_at < self.started_at
        {
            return Err(RunInvariantError::CompletedBeforeStarted {
                run_id: self.run_id.clone(),
            });
        }
        let error_matches_status = self.error.is_some() == (self.status == RunStatus::Failed);
        if !error_matches_status {
            return Err(RunInvariantError::ErrorStatusMismatch {
                run_id: self.run_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: i64) -> Timestamp {
        Timestamp::from_unix_millis(millis)
    }

    #[test]
    fn start_creates_running_run() {
        let run = Run::start(
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            Value::Null,
            ts(0),
            None,
        );
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());
        assert!(run.check_invariants().is_ok());
    }

    #[test]
    fn end_without_error_completes() {
        let mut run = Run::start(
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            Value::Null,
            ts(0),
            None,
        );
        run.end(ts(10), Some(Value::Bool(true)), None);
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.check_invariants().is_ok());
    }

    #[test]
    fn end_with_error_fails() {
        let mut run = Run::start(
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            Value::Null,
            ts(0),
            None,
        );
        run.end(ts(10), None, Some("boom".to_string()));
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.check_invariants().is_ok());
    }

    #[test]
    fn completed_before_started_is_invalid() {
        let mut run = Run::start(
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            Value::Null,
            ts(10),
            None,
        );
        run.completed_at = Some(ts(5));
        assert!(matches!(
            run.check_invariants(),
            Err(RunInvariantError::CompletedBeforeStarted { .. })
        ));
    }

    #[test]
    fn failed_status_without_error_is_invalid() {
        let mut run = Run::start(
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            Value::Null,
            ts(0),
            None,
        );
        run.status = RunStatus::Failed;
        assert!(matches!(
            run.check_invariants(),
            Err(RunInvariantError::ErrorStatusMismatch { .. })
        ));
    }
}
