// crates/decipipe-queue/src/lib.rs
// ============================================================================
// Crate: decipipe-queue
// Description: Broker-agnostic queue adapter trait (C6's enqueue side, C7's
//              poll side) plus three implementations.
// Purpose: Let the ingestion service and the processor worker depend on one
//          small trait instead of a specific broker, with a Source/Sink
//          registry split between push and poll sides.
// ============================================================================

//! ## Overview
//! [`QueueAdapter`] is the single seam between C6 (which only ever calls
//! `push_*`) and C7 (which only ever calls `poll`/`ack`). Three
//! implementations are provided: [`memory::InMemoryQueue`] for tests and
//! single-process deployments, [`http::HttpQueue`] for an HTTP-fronted
//! broker, and [`durable::DurableFileQueue`] for an append-only,
//! crash-recoverable local queue standing in for a durable broker.

pub mod durable;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use decipipe_model::DecisionEvent;
use decipipe_model::EventEnvelope;
use decipipe_model::Run;
use decipipe_model::Step;

pub use durable::DurableFileQueue;
pub use http::HttpQueue;
pub use memory::InMemoryQueue;

/// Errors a [`QueueAdapter`] implementation may return.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The adapter could not reach its backing broker.
    #[error("queue unreachable: {0}")]
    Unreachable(String),
    /// The backing broker rejected the request.
    #[error("queue rejected message: {0}")]
    Rejected(String),
    /// The message named by `ack` is not known to this adapter.
    #[error("unknown message id: {0}")]
    UnknownMessage(String),
}

/// One message as seen by the processor worker: a durable envelope plus
/// the opaque id it must `ack` to acknowledge delivery.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Broker-assigned (or adapter-assigned) delivery identifier.
    pub message_id: String,
    /// The decoded envelope.
    pub envelope: EventEnvelope,
}

/// Broker-agnostic push/poll interface.
///
/// # Invariants
/// - `push_*` succeeding means the message is durably enqueued from the
///   caller's perspective; ingestion only returns 200 after this succeeds.
/// - `poll` never returns the same still-unacknowledged message twice to
///   the *same* caller inside of one redelivery window, but a message not
///   acknowledged is redelivered on a later `poll` call.
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Enqueues a single decision event.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker is unreachable or rejects it.
    async fn push_decision_event(&self, event: DecisionEvent) -> Result<(), QueueError>;

    /// Enqueues a batch of decision events as one logical unit.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker is unreachable or rejects it.
    async fn push_decision_events(&self, events: Vec<DecisionEvent>) -> Result<(), QueueError>;

    /// Enqueues a run snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker is unreachable or rejects it.
    async fn push_run(&self, run: Run) -> Result<(), QueueError>;

    /// Enqueues a step snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker is unreachable or rejects it.
    async fn push_step(&self, step: Step) -> Result<(), QueueError>;

    /// Polls up to `batch_size` undelivered (or redelivery-eligible)
    /// messages.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker is unreachable.
    async fn poll(&self, batch_size: usize) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledges successful processing of one message, removing it from
    /// the redelivery set.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownMessage`] if `message_id` is not
    /// currently outstanding.
    async fn ack(&self, message_id: &str) -> Result<(), QueueError>;
}
