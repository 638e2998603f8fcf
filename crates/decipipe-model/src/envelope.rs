// crates/decipipe-model/src/envelope.rs
// ============================================================================
// Module: Event Envelope
// Description: The `{type, data}` wire envelope and its four variants.
// Purpose: Model the heterogeneous ingestion payload as a closed sum type
//          with per-variant validators, rather than an untyped record.
// Dependencies: serde_json, crate::{run,step,decision_event}
// ============================================================================

//! ## Overview
//! `type` is drawn from the closed set `{decision, decisions, run, step}`.
//! Unknown `type` values and structurally invalid `data` are both
//! represented as [`EnvelopeError`] rather than silently coerced.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::decision_event::DecisionEvent;
use crate::run::Run;
use crate::step::Step;

/// The four variants an ingestion envelope may carry.
///
/// # Invariants
/// - Exhaustive: no fifth variant exists on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventEnvelope {
    /// A single decision event.
    Decision(DecisionEvent),
    /// A batch of decision events.
    Decisions(Vec<DecisionEvent>),
    /// A run snapshot.
    Run(Box<Run>),
    /// A step snapshot.
    Step(Box<Step>),
}

impl EventEnvelope {
    /// The `type` label this envelope would serialize with, used for
    /// logging and metrics without re-serializing the payload.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Decision(_) => "decision",
            Self::Decisions(_) => "decisions",
            Self::Run(_) => "run",
            Self::Step(_) => "step",
        }
    }
}

/// Raw, untyped envelope shape used to distinguish "missing type/data"
/// from "unknown type" before attempting full deserialization.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    /// The declared variant name, if present.
    #[serde(default)]
    pub r#type: Option<String>,
    /// The declared payload, if present.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Errors from validating a raw envelope into a typed [`EventEnvelope`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The envelope is missing `type`, `data`, or both.
    #[error("envelope is missing `type` and/or `data`")]
    MissingFields,
    /// `type` is not one of the four known variants.
    #[error("unknown envelope type `{0}`")]
    UnknownType(String),
    /// `data` does not match the schema for the declared `type`.
    #[error("invalid payload for type `{type_name}`: {source}")]
    InvalidPayload {
        /// The declared variant name.
        type_name: String,
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl RawEnvelope {
    /// Validates and converts this raw envelope into a typed
    /// [`EventEnvelope`].
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MissingFields`] when `type` or `data` is
    /// absent, [`EnvelopeError::UnknownType`] when `type` is not one of
    /// the four known variants, and [`EnvelopeError::InvalidPayload`] when
    /// `data` fails to deserialize into the shape `type` declares.
    pub fn into_typed(self) -> Result<EventEnvelope, EnvelopeError> {
        let Some(type_name) = self.r#type else {
            return Err(EnvelopeError::MissingFields);
        };
        let Some(data) = self.data else {
            return Err(EnvelopeError::MissingFields);
        };
        let decode = |data: Value| -> Result<_, serde_json::Error> { serde_json::from_value(data) };
        match type_name.as_str() {
            "decision" => decode(data)
                .map(EventEnvelope::Decision)
                .map_err(|source| EnvelopeError::InvalidPayload { type_name, source }),
            "decisions" => decode(data)
                .map(EventEnvelope::Decisions)
                .map_err(|source| EnvelopeError::InvalidPayload { type_name, source }),
            "run" => decode(data)
                .map(|run| EventEnvelope::Run(Box::new(run)))
                .map_err(|source| EnvelopeError::InvalidPayload { type_name, source }),
            "step" => decode(data)
                .map(|step| EventEnvelope::Step(Box::new(step)))
                .map_err(|source| EnvelopeError::InvalidPayload { type_name, source }),
            _ => Err(EnvelopeError::UnknownType(type_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_type_is_rejected() {
        let raw = RawEnvelope {
            r#type: None,
            data: Some(Value::Null),
        };
        assert!(matches!(
            raw.into_typed(),
            Err(EnvelopeError::MissingFields)
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = RawEnvelope {
            r#type: Some("bogus".to_string()),
            data: Some(Value::Null),
        };
        assert!(matches!(
            raw.into_typed(),
            Err(EnvelopeError::UnknownType(_))
        ));
    }

    fn valid_decision_payload() -> serde_json::Value {
        json!({
            "eventId": "evt-1",
            "stepId": "step-1",
            "runId": "run-1",
            "outcome": "kept",
            "itemId": "item-1",
            "input": {"id": "item-1"},
            "reason": "kept",
            "timestamp": 0,
        })
    }

    #[test]
    fn decision_with_known_fields_is_accepted() {
        let raw = RawEnvelope {
            r#type: Some("decision".to_string()),
            data: Some(valid_decision_payload()),
        };
        assert!(matches!(raw.into_typed(), Ok(EventEnvelope::Decision(_))));
    }

    #[test]
    fn decision_with_an_unknown_field_is_rejected() {
        let mut payload = valid_decision_payload();
        payload["extraField"] = json!("surprise");
        let raw = RawEnvelope {
            r#type: Some("decision".to_string()),
            data: Some(payload),
        };
        assert!(matches!(
            raw.into_typed(),
            Err(EnvelopeError::InvalidPayload { .. })
        ));
    }
}
