// crates/decipipe-model/src/decision_event.rs
// ============================================================================
// Module: DecisionEvent
// Description: One decision about one item at one step.
// Purpose: Canonical wire/storage shape for decision events, plus the
//          deterministic blob-key derivation the blob store relies on.
// Dependencies: serde_json, crate::ids, crate::status, crate::timestamp
// ============================================================================

//! ## Overview
//! A [`DecisionEvent`] is appended once by the client per captured item and
//! never mutated afterward. Ownership moves through the pipeline: the
//! capture façade owns it until buffered, the transport owns the in-flight
//! batch, the queue owns durability, the blob store owns the authoritative
//! payload, and the analytical store owns an indexable reference.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::EventId;
use crate::ids::ItemId;
use crate::ids::RunId;
use crate::ids::StepId;
use crate::status::Outcome;
use crate::timestamp::Timestamp;

/// One decision about one item at one step.
///
/// # Invariants
/// - Appended once; never mutated after creation.
/// - `metadata` carries at least `inputCount`, `outputCount`, and
///   `sampled` when emitted by the capture façade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DecisionEvent {
    /// Opaque unique event identifier.
    pub event_id: EventId,
    /// The step this decision was made at.
    pub step_id: StepId,
    /// The run this decision belongs to.
    pub run_id: RunId,
    /// What happened to the item.
    pub outcome: Outcome,
    /// Opaque item identifier, stable across steps for the same item.
    pub item_id: ItemId,
    /// The item as seen by the step.
    pub input: Value,
    /// The item as emitted by the step, absent when eliminated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Human-readable explanation.
    pub reason: String,
    /// Numeric score, present for `outcome == Scored`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Opaque metadata: `inputCount`, `outputCount`, `sampled`, and echoed
    /// step config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
    /// When the decision was made.
    pub timestamp: Timestamp,
}

impl DecisionEvent {
    /// Returns the `decisions/YYYY/MM/DD/<eventId>.json` blob key for this
    /// event, partitioned by the date of `timestamp`.
    #[must_use]
    pub fn blob_key(&self) -> String {
        let (year, month, day) = self.timestamp.date_parts();
        format!(
            "decisions/{year:04}/{month:02}/{day:02}/{}.json",
            self.event_id
        )
    }

    /// Reads the `sampled` flag from metadata, defaulting to `false` when
    /// absent (full-capture events carry no such flag).
    #[must_use]
    pub fn sampled(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("sampled"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
