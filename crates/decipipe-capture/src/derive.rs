// crates/decipipe-capture/src/derive.rs
// ============================================================================
// Module: Decision Derivation
// Description: Diffs a step's input and output to automatically derive
//              per-item DecisionEvents, or delegates to a caller-supplied
//              callback.
// Purpose: Implement the "decision derivation" algorithm exactly, including
//          the sampling and sequence/single-item branches.
// Dependencies: decipipe-model, decipipe-sampler, serde_json
// ============================================================================

//! ## Overview
//! Callers with statically known item shapes should prefer
//! [`DecisionCallback`] and pass decisions explicitly; this module's
//! automatic path exists for pipelines whose items are genuinely dynamic
//! JSON values, reserving structural derivation for that case.

use std::collections::BTreeMap;

use decipipe_model::DecisionEvent;
use decipipe_model::EventId;
use decipipe_model::ItemId;
use decipipe_model::Outcome;
use decipipe_model::RunId;
use decipipe_model::StepId;
use decipipe_model::StepType;
use decipipe_model::Timestamp;
use decipipe_sampler::CaptureLevel;
use decipipe_sampler::should_sample;
use decipipe_sampler::target_size;
use serde_json::Value;
use serde_json::json;

/// A decision explicitly supplied by the caller for one item, in place of
/// automatic derivation.
#[derive(Debug, Clone)]
pub struct DecisionOverride {
    /// The outcome to record.
    pub outcome: Outcome,
    /// The human-readable explanation to record.
    pub reason: String,
    /// Optional score, typically set for `Outcome::Scored`.
    pub score: Option<f64>,
}

/// Caller-supplied decision logic, invoked once per candidate item with
/// `(input_item, output_item, index)`. Returning `None` skips emission
/// for that item entirely.
pub trait DecisionCallback: Send + Sync {
    /// Classifies one item's decision, or returns `None` to skip it.
    fn classify(&self, input: &Value, output: Option<&Value>, index: usize) -> Option<DecisionOverride>;
}

impl<F> DecisionCallback for F
where
    F: Fn(&Value, Option<&Value>, usize) -> Option<DecisionOverride> + Send + Sync,
{
    fn classify(&self, input: &Value, output: Option<&Value>, index: usize) -> Option<DecisionOverride> {
        self(input, output, index)
    }
}

/// Input to [`derive_decision_events`].
pub struct DeriveInput<'a> {
    /// The step the decisions belong to.
    pub step_id: &'a StepId,
    /// The run the step belongs to.
    pub run_id: &'a RunId,
    /// The step's type, used for automatic-classification rules.
    pub step_type: StepType,
    /// The step's echoed configuration, templated into elimination
    /// reasons and attached to each event's metadata.
    pub config: Option<&'a BTreeMap<String, Value>>,
    /// The item(s) as seen by the step.
    pub input: &'a Value,
    /// The item(s) as emitted by the step.
    pub output: &'a Value,
    /// The active capture level.
    pub capture_level: CaptureLevel,
    /// Optional explicit decision logic, bypassing automatic derivation.
    pub callback: Option<&'a dyn DecisionCallback>,
    /// Timestamp to stamp onto every emitted event.
    pub now: Timestamp,
}

/// Returns the sequence length of `value`, or `1` if it is not an array.
#[must_use]
pub fn item_count(value: &Value) -> u64 {
    match value {
        Value::Array(items) => items.len() as u64,
        Value::Null => 0,
        _ => 1,
    }
}

/// Extracts the identity-field value for a sequence element: the first
/// present of `id`, `itemId`, `key`, falling back to a positional
/// `item-<index>` token.
fn extract_item_key(value: &Value, index: usize) -> String {
    if let Value::Object(map) = value {
        for field in ["id", "itemId", "key"] {
            if let Some(found) = map.get(field) {
                if let Some(s) = found.as_str() {
                    return s.to_string();
                }
                return found.to_string();
            }
        }
    }
    format!("item-{index}")
}

/// Runs the decision-derivation algorithm for one step invocation.
///
/// Returns every [`DecisionEvent`] that should be handed to the event
/// buffer; callers are responsible for the non-blocking hand-off.
#[must_use]
pub fn derive_decision_events(
    input_spec: &DeriveInput<'_>,
    mut next_event_id: impl FnMut() -> EventId,
) -> Vec<DecisionEvent> {
    if matches!(input_spec.capture_level, CaptureLevel::MetricsOnly) {
        return Vec::new();
    }

    let input_count = item_count(input_spec.input);
    let output_count = item_count(input_spec.output);

    let both_sequences = matches!(input_spec.input, Value::Array(_))
        && matches!(input_spec.output, Value::Array(_));

    let candidates: Vec<Candidate<'_>> = if both_sequences {
        derive_sequence_candidates(input_spec)
    } else {
        derive_single_candidate(input_spec)
    };

    let target = target_size(input_count);
    let mut events = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let index = candidate.index as u64;
        if matches!(input_spec.capture_level, CaptureLevel::Sampled)
            && !should_sample(index, input_count.max(1), target)
        {
            continue;
        }
        let Some(decision) = classify(input_spec, &candidate) else {
            continue;
        };
        let sampled_interior = index > 0 && input_count > 0 && index < input_count - 1;
        let mut metadata = BTreeMap::new();
        metadata.insert("inputCount".to_string(), json!(input_count));
        metadata.insert("outputCount".to_string(), json!(output_count));
        metadata.insert("sampled".to_string(), json!(sampled_interior));
        if let Some(config) = input_spec.config {
            metadata.insert("config".to_string(), json!(config));
        }
        events.push(DecisionEvent {
            event_id: next_event_id(),
            step_id: input_spec.step_id.clone(),
            run_id: input_spec.run_id.clone(),
            outcome: decision.outcome,
            item_id: ItemId::new(candidate.item_key.clone()),
            input: candidate.input.clone(),
            output: candidate.output.cloned(),
            reason: decision.reason,
            score: decision.score,
            metadata: Some(metadata),
            timestamp: input_spec.now,
        });
    }
    events
}

/// One item awaiting classification: its index, identity key, and the
/// input/output values it resolved to.
struct Candidate<'a> {
    index: usize,
    item_key: String,
    input: &'a Value,
    output: Option<&'a Value>,
}

fn derive_sequence_candidates<'a>(spec: &DeriveInput<'a>) -> Vec<Candidate<'a>> {
    let Value::Array(inputs) = spec.input else {
        return Vec::new();
    };
    let Value::Array(outputs) = spec.output else {
        return Vec::new();
    };

    let mut by_key: BTreeMap<String, usize> = BTreeMap::new();
    for (idx, item) in outputs.iter().enumerate() {
        by_key.entry(extract_item_key(item, idx)).or_insert(idx);
    }

    inputs
        .iter()
        .enumerate()
        .map(|(index, input_item)| {
            let item_key = extract_item_key(input_item, index);
            let output = by_key
                .get(&item_key)
                .and_then(|&idx| outputs.get(idx))
                .or_else(|| outputs.iter().find(|candidate| *candidate == input_item));
            Candidate {
                index,
                item_key,
                input: input_item,
                output,
            }
        })
        .collect()
}

fn derive_single_candidate<'a>(spec: &DeriveInput<'a>) -> Vec<Candidate<'a>> {
    let output = match spec.output {
        Value::Null => None,
        other => Some(other),
    };
    vec![Candidate {
        index: 0,
        item_key: "single-item".to_string(),
        input: spec.input,
        output,
    }]
}

fn classify(spec: &DeriveInput<'_>, candidate: &Candidate<'_>) -> Option<DecisionOverride> {
    if let Some(callback) = spec.callback {
        return callback.classify(candidate.input, candidate.output, candidate.index);
    }
    Some(match candidate.output {
        Some(output) if matches!(spec.step_type, StepType::Rank | StepType::Score) => {
            let score = output
                .get("score")
                .or_else(|| output.get("relevanceScore"))
                .and_then(Value::as_f64);
            DecisionOverride {
                outcome: Outcome::Scored,
                reason: format!("Item scored: {}", score.unwrap_or(0.0)),
                score,
            }
        }
        Some(_) => DecisionOverride {
            outcome: Outcome::Kept,
            reason: format!("Item passed {} step", spec.step_type.as_str()),
            score: None,
        },
        None => DecisionOverride {
            outcome: Outcome::Eliminated,
            reason: elimination_reason(spec),
            score: None,
        },
    })
}

fn elimination_reason(spec: &DeriveInput<'_>) -> String {
    let Some(config) = spec.config else {
        return format!("Item eliminated at {} step", spec.step_type.as_str());
    };
    if let Some(threshold) = config.get("threshold") {
        return format!("Item eliminated: below threshold {threshold}");
    }
    if let Some(match_type) = config.get("matchType").and_then(Value::as_str) {
        return format!("Item eliminated: did not satisfy match type {match_type}");
    }
    format!("Item eliminated at {} step", spec.step_type.as_str())
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use serde_json::json;

    use super::*;

    fn spec<'a>(
        step_type: StepType,
        config: Option<&'a BTreeMap<String, Value>>,
        input: &'a Value,
        output: &'a Value,
        capture_level: CaptureLevel,
    ) -> DeriveInput<'a> {
        DeriveInput {
            step_id: Box::leak(Box::new(StepId::new("step-1"))),
            run_id: Box::leak(Box::new(RunId::new("run-1"))),
            step_type,
            config,
            input,
            output,
            capture_level,
            callback: None,
            now: Timestamp::from_unix_millis(0),
        }
    }

    fn ids() -> impl FnMut() -> EventId {
        let mut counter = 0u64;
        move || {
            counter += 1;
            EventId::new(format!("evt-{counter}"))
        }
    }

    #[test]
    fn happy_path_filter_scenario() {
        let input = json!([
            {"id": "a", "score": 0.9},
            {"id": "b", "score": 0.1},
            {"id": "c", "score": 0.7},
            {"id": "d", "score": 0.05},
        ]);
        let output = json!([
            {"id": "a", "score": 0.9},
            {"id": "c", "score": 0.7},
        ]);
        let spec = spec(StepType::Filter, None, &input, &output, CaptureLevel::Full);
        let events = derive_decision_events(&spec, ids());
        assert_eq!(events.len(), 4);
        let kept: Vec<_> = events
            .iter()
            .filter(|e| e.outcome == Outcome::Kept)
            .map(|e| e.item_id.as_str())
            .collect();
        let eliminated: Vec<_> = events
            .iter()
            .filter(|e| e.outcome == Outcome::Eliminated)
            .map(|e| e.item_id.as_str())
            .collect();
        assert_eq!(kept, vec!["a", "c"]);
        assert_eq!(eliminated, vec!["b", "d"]);
    }

    #[test]
    fn rank_step_scores_surviving_items() {
        let input = json!([{"id": "a"}, {"id": "b"}]);
        let output = json!([{"id": "a", "score": 0.8}]);
        let spec = spec(StepType::Rank, None, &input, &output, CaptureLevel::Full);
        let events = derive_decision_events(&spec, ids());
        let scored = events.iter().find(|e| e.item_id.as_str() == "a").unwrap();
        assert_eq!(scored.outcome, Outcome::Scored);
        assert_eq!(scored.score, Some(0.8));
    }

    #[test]
    fn metrics_only_emits_nothing() {
        let input = json!([{"id": "a"}]);
        let output = json!([{"id": "a"}]);
        let spec = spec(
            StepType::Filter,
            None,
            &input,
            &output,
            CaptureLevel::MetricsOnly,
        );
        assert!(derive_decision_events(&spec, ids()).is_empty());
    }

    #[test]
    fn single_item_step_emits_at_most_one_event() {
        let input = json!({"text": "hello"});
        let output = json!({"text": "HELLO"});
        let spec = spec(StepType::Transform, None, &input, &output, CaptureLevel::Full);
        let events = derive_decision_events(&spec, ids());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id.as_str(), "single-item");
        assert_eq!(events[0].outcome, Outcome::Kept);
    }

    #[test]
    fn zero_input_count_emits_nothing() {
        let input = json!([]);
        let output = json!([]);
        let spec = spec(StepType::Filter, None, &input, &output, CaptureLevel::Full);
        assert!(derive_decision_events(&spec, ids()).is_empty());
    }

    #[test]
    fn sampling_keeps_boundaries_and_caps_interior() {
        let items: Vec<Value> = (0..5000).map(|i| json!({"id": format!("item-{i}")})).collect();
        let input = Value::Array(items.clone());
        let output = Value::Array(items);
        let spec = spec(StepType::Filter, None, &input, &output, CaptureLevel::Sampled);
        let events = derive_decision_events(&spec, ids());
        assert!(events.len() as u64 <= 37);
        let keys: Vec<_> = events.iter().map(|e| e.item_id.as_str()).collect();
        assert!(keys.contains(&"item-0"));
        assert!(keys.contains(&"item-4999"));
    }
}
