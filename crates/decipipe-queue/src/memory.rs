// crates/decipipe-queue/src/memory.rs
// ============================================================================
// Module: In-Memory Queue
// Description: Single-process QueueAdapter backed by a VecDeque, with a
//              visibility-timeout redelivery model.
// Purpose: Zero-dependency adapter for tests and single-process local runs.
// Dependencies: parking_lot, decipipe-model
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use decipipe_model::DecisionEvent;
use decipipe_model::EventEnvelope;
use decipipe_model::Run;
use decipipe_model::Step;
use parking_lot::Mutex;

use crate::QueueAdapter;
use crate::QueueError;
use crate::QueueMessage;

struct InFlight {
    message: QueueMessage,
    visible_at: Instant,
}

struct State {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, InFlight>,
    next_id: u64,
}

/// In-memory [`QueueAdapter`]. Messages not `ack`'d within
/// `visibility_timeout` become eligible for redelivery on a later `poll`.
pub struct InMemoryQueue {
    state: Mutex<State>,
    visibility_timeout: Duration,
}

impl InMemoryQueue {
    /// Builds a queue with the default 30-second visibility timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_visibility_timeout(Duration::from_secs(30))
    }

    /// Builds a queue with an explicit visibility timeout.
    #[must_use]
    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
                next_id: 0,
            }),
            visibility_timeout,
        }
    }

    fn enqueue(&self, envelope: EventEnvelope) {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.ready.push_back(QueueMessage {
            message_id: format!("mem-{id}"),
            envelope,
        });
    }

    /// Number of messages neither delivered nor acknowledged, for tests and
    /// metrics.
    #[must_use]
    pub fn depth(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.in_flight.len()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueAdapter for InMemoryQueue {
    async fn push_decision_event(&self, event: DecisionEvent) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Decision(event));
        Ok(())
    }

    async fn push_decision_events(&self, events: Vec<DecisionEvent>) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Decisions(events));
        Ok(())
    }

    async fn push_run(&self, run: Run) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Run(Box::new(run)));
        Ok(())
    }

    async fn push_step(&self, step: Step) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Step(Box::new(step)));
        Ok(())
    }

    async fn poll(&self, batch_size: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(entry) = state.in_flight.remove(&id) {
                state.ready.push_front(entry.message);
            }
        }

        let mut batch = Vec::with_capacity(batch_size.min(state.ready.len()));
        while batch.len() < batch_size {
            let Some(message) = state.ready.pop_front() else {
                break;
            };
            state.in_flight.insert(
                message.message_id.clone(),
                InFlight {
                    message: message.clone(),
                    visible_at: now + self.visibility_timeout,
                },
            );
            batch.push(message);
        }
        Ok(batch)
    }

    async fn ack(&self, message_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state
            .in_flight
            .remove(message_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownMessage(message_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use decipipe_model::EventId;
    use decipipe_model::ItemId;
    use decipipe_model::Outcome;
    use decipipe_model::RunId;
    use decipipe_model::StepId;
    use decipipe_model::Timestamp;
    use serde_json::Value;

    use super::*;

    fn sample_event() -> DecisionEvent {
        DecisionEvent {
            event_id: EventId::new("evt-1"),
            step_id: StepId::new("step-1"),
            run_id: RunId::new("run-1"),
            outcome: Outcome::Kept,
            item_id: ItemId::new("item-1"),
            input: Value::Null,
            output: None,
            reason: "kept".to_string(),
            score: None,
            metadata: None,
            timestamp: Timestamp::from_unix_millis(0),
        }
    }

    #[tokio::test]
    async fn push_then_poll_then_ack_drains_the_queue() {
        let queue = InMemoryQueue::new();
        queue.push_decision_event(sample_event()).await.unwrap();
        assert_eq!(queue.depth(), 1);
        let batch = queue.poll(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        queue.ack(&batch[0].message_id).await.unwrap();
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered_after_visibility_timeout() {
        let queue = InMemoryQueue::with_visibility_timeout(Duration::from_millis(10));
        queue.push_decision_event(sample_event()).await.unwrap();
        let first = queue.poll(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(queue.poll(10).await.unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let redelivered = queue.poll(10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].message_id, first[0].message_id);
    }

    #[tokio::test]
    async fn ack_unknown_message_errors() {
        let queue = InMemoryQueue::new();
        let result = queue.ack("not-a-real-id").await;
        assert!(matches!(result, Err(QueueError::UnknownMessage(_))));
    }
}
