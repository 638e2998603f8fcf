// crates/decipipe-model/src/lib.rs
// ============================================================================
// Module: Decipipe Model
// Description: Canonical types for Run, Step, DecisionEvent, the ingestion
//              envelope, and derived aggregates.
// Purpose: Single source of truth for the wire/storage shapes shared by
//          every other crate in the workspace.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! This crate defines the canonical entities that flow end-to-end through
//! the decision observability pipeline: [`Run`], [`Step`], and
//! [`DecisionEvent`], the `{type, data}` [`EventEnvelope`] that carries
//! them over the wire, and the derived-aggregate types the processor and
//! query API both depend on.
//!
//! Every other crate in the workspace depends on this one and none of its
//! types depend on any other workspace crate: it is the dependency-free
//! foundation the rest of the workspace builds on.

pub mod aggregates;
pub mod decision_event;
pub mod envelope;
pub mod ids;
pub mod run;
pub mod status;
pub mod step;
pub mod timestamp;

pub use aggregates::RunMetrics;
pub use aggregates::StepMetrics;
pub use aggregates::StepMetricsRow;
pub use aggregates::elimination_ratio;
pub use decision_event::DecisionEvent;
pub use envelope::EnvelopeError;
pub use envelope::EventEnvelope;
pub use envelope::RawEnvelope;
pub use ids::EventId;
pub use ids::ItemId;
pub use ids::PipelineId;
pub use ids::RunId;
pub use ids::StepId;
pub use run::Run;
pub use run::RunInvariantError;
pub use status::Outcome;
pub use status::RunStatus;
pub use status::StepType;
pub use status::UnknownLabel;
pub use step::Step;
pub use timestamp::Timestamp;
