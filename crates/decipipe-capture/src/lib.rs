// crates/decipipe-capture/src/lib.rs
// ============================================================================
// Crate: decipipe-capture
// Description: The client capture SDK — buffer (C3), transport (C4), and
//              façade (C5), plus decision derivation and the observer hook.
// Purpose: Give integrators a silent-by-default, non-blocking way to record
//          a pipeline's decisions without coupling their control flow to
//          the ingestion collector's availability.
// ============================================================================

//! The client capture SDK: a non-blocking façade ([`CaptureClient`]) over a
//! bounded event buffer ([`EventBuffer`]) and a retrying HTTP transport
//! ([`Transport`]). Integrators call [`CaptureClient::start_run`], wrap
//! each pipeline stage in [`CaptureClient::step`], and call
//! [`CaptureClient::end_run`]; decision events are derived automatically
//! unless a [`DecisionCallback`] is supplied.
//!
//! Every public entry point here is infallible from the caller's
//! perspective except `step`'s own wrapped closure: observability failures
//! never propagate into application control flow.

pub mod buffer;
pub mod config;
pub mod derive;
pub mod facade;
pub mod observer;
pub mod transport;

pub use buffer::DecisionSink;
pub use buffer::EventBuffer;
pub use buffer::EventBufferConfig;
pub use config::BufferConfig;
pub use config::CaptureConfig;
pub use config::TransportConfig;
pub use derive::DecisionCallback;
pub use derive::DecisionOverride;
pub use derive::DeriveInput;
pub use derive::derive_decision_events;
pub use facade::CaptureClient;
pub use observer::CaptureObserver;
pub use observer::NoopObserver;
pub use transport::Transport;

pub use decipipe_sampler::CaptureLevel;
