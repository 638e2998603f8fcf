// crates/decipipe-processor/src/lib.rs
// ============================================================================
// Crate: decipipe-processor
// Description: Polling worker (C7) that drains the queue into the blob
//              store and the analytical store.
// Purpose: The single writer for both stores; owns the in-memory step
//          caches needed for aggregation.
// ============================================================================

//! ## Overview
//! A `loop { poll; dispatch; }` body that treats one failed item as
//! non-fatal to the loop itself: one failed message is logged and left
//! unacknowledged for redelivery rather than returned as an error, since
//! the queue, not the processor, owns retry policy.
//!
//! [`Processor`] is the single writer for both the blob store and the
//! analytical store. It keeps in-memory caches, keyed by step, of each
//! step's own snapshot and its decision events, accessed only from the
//! poll loop so neither needs locking.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use decipipe_analytics::AnalyticsError;
use decipipe_analytics::AnalyticsStore;
use decipipe_blobstore::BlobMetadata;
use decipipe_blobstore::BlobStore;
use decipipe_blobstore::BlobStoreError;
use decipipe_model::DecisionEvent;
use decipipe_model::EventEnvelope;
use decipipe_model::PipelineId;
use decipipe_model::Run;
use decipipe_model::Step;
use decipipe_model::StepId;
use decipipe_queue::QueueAdapter;
use decipipe_queue::QueueMessage;
use tracing::info;
use tracing::warn;

/// The pipeline id recorded for a decision event whose step has not yet
/// been observed by this process (messages may arrive out of order).
const UNKNOWN_PIPELINE_ID: &str = "unknown";

/// Errors raised while dispatching one queue message.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The blob store write failed.
    #[error("blob store: {0}")]
    Blob(#[from] BlobStoreError),
    /// The analytical store write failed.
    #[error("analytical store: {0}")]
    Analytics(#[from] AnalyticsError),
}

/// The worker loop draining a queue into the blob and analytical stores.
///
/// # Invariants
/// - `step_cache` and `events_by_step` are touched only from
///   [`Processor::run_once`], never shared across tasks.
pub struct Processor {
    queue: Arc<dyn QueueAdapter>,
    blob: Arc<dyn BlobStore>,
    analytics: Arc<AnalyticsStore>,
    batch_size: usize,
    poll_interval: Duration,
    seen_message_ids: HashSet<String>,
    step_cache: HashMap<StepId, Step>,
    events_by_step: HashMap<StepId, Vec<DecisionEvent>>,
}

impl Processor {
    /// Builds a processor over the given queue, blob store, and analytical
    /// store.
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueAdapter>,
        blob: Arc<dyn BlobStore>,
        analytics: Arc<AnalyticsStore>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            blob,
            analytics,
            batch_size,
            poll_interval,
            seen_message_ids: HashSet::new(),
            step_cache: HashMap::new(),
            events_by_step: HashMap::new(),
        }
    }

    /// Runs the poll loop until `shutdown` resolves, finishing the
    /// in-flight batch first.
    pub async fn run_until(&mut self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("processor shutting down after current batch");
                    break;
                }
                () = self.run_once() => {}
            }
        }
    }

    /// Polls one batch and dispatches every message in it, sleeping for
    /// `poll_interval` when the batch is empty.
    async fn run_once(&mut self) {
        let messages = match self.queue.poll(self.batch_size).await {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %err, "queue poll failed");
                tokio::time::sleep(self.poll_interval).await;
                return;
            }
        };
        if messages.is_empty() {
            tokio::time::sleep(self.poll_interval).await;
            return;
        }
        for message in messages {
            self.dispatch_message(message).await;
        }
    }

    async fn dispatch_message(&mut self, message: QueueMessage) {
        if self.seen_message_ids.contains(&message.message_id) {
            if let Err(err) = self.queue.ack(&message.message_id).await {
                warn!(error = %err, message_id = %message.message_id, "ack of already-seen message failed");
            }
            return;
        }
        match self.handle_envelope(message.envelope).await {
            Ok(()) => {
                self.seen_message_ids.insert(message.message_id.clone());
                if let Err(err) = self.queue.ack(&message.message_id).await {
                    warn!(error = %err, message_id = %message.message_id, "ack failed after successful processing");
                }
            }
            Err(err) => {
                warn!(error = %err, message_id = %message.message_id, "leaving message unacknowledged for redelivery");
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: EventEnvelope) -> Result<(), ProcessorError> {
        match envelope {
            EventEnvelope::Decision(event) => self.handle_decision_event(event).await,
            EventEnvelope::Decisions(events) => {
                for event in events {
                    self.handle_decision_event(event).await?;
                }
                Ok(())
            }
            EventEnvelope::Run(run) => self.handle_run(*run).await,
            EventEnvelope::Step(step) => self.handle_step(*step).await,
        }
    }

    async fn handle_decision_event(&mut self, event: DecisionEvent) -> Result<(), ProcessorError> {
        let blob_key = event.blob_key();
        self.blob
            .put_json(
                &blob_key,
                &serde_json::to_value(&event).unwrap_or(serde_json::Value::Null),
                BlobMetadata {
                    event_id: Some(event.event_id.to_string()),
                    run_id: Some(event.run_id.to_string()),
                    step_id: Some(event.step_id.to_string()),
                },
            )
            .await?;

        let pipeline_id = self
            .step_cache
            .get(&event.step_id)
            .map(|step| step.pipeline_id.clone())
            .unwrap_or_else(|| PipelineId::new(UNKNOWN_PIPELINE_ID));
        self.analytics.insert_decision_event(&event, &pipeline_id, &blob_key)?;

        self.events_by_step.entry(event.step_id.clone()).or_default().push(event);
        Ok(())
    }

    async fn handle_run(&mut self, run: Run) -> Result<(), ProcessorError> {
        self.blob
            .put_json(
                &run.blob_key(),
                &serde_json::to_value(&run).unwrap_or(serde_json::Value::Null),
                BlobMetadata {
                    run_id: Some(run.run_id.to_string()),
                    ..BlobMetadata::default()
                },
            )
            .await?;

        if run.status.is_terminal() {
            let steps = self.analytics.list_steps_by_run(&run.run_id)?;
            self.analytics.upsert_run(&run, &steps)?;
        }
        Ok(())
    }

    async fn handle_step(&mut self, step: Step) -> Result<(), ProcessorError> {
        self.blob
            .put_json(
                &step.blob_key(),
                &serde_json::to_value(&step).unwrap_or(serde_json::Value::Null),
                BlobMetadata {
                    run_id: Some(step.run_id.to_string()),
                    step_id: Some(step.step_id.to_string()),
                    ..BlobMetadata::default()
                },
            )
            .await?;

        let is_complete = step.completed_at.is_some();
        self.step_cache.insert(step.step_id.clone(), step.clone());
        if is_complete {
            let events = self.events_by_step.get(&step.step_id).cloned().unwrap_or_default();
            self.analytics.upsert_step(&step, &events)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, reason = "Test assertions use expect/unwrap for clarity.")]

    use std::time::Duration;

    use decipipe_blobstore::LocalFsBlobStore;
    use decipipe_model::EventId;
    use decipipe_model::ItemId;
    use decipipe_model::Outcome;
    use decipipe_model::RunId;
    use decipipe_model::RunStatus;
    use decipipe_model::StepType;
    use decipipe_model::Timestamp;
    use decipipe_queue::InMemoryQueue;
    use serde_json::Value;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    async fn processor_with_memory_backends() -> (Processor, Arc<InMemoryQueue>, Arc<AnalyticsStore>) {
        let queue = Arc::new(InMemoryQueue::new());
        let blob_root = tempdir().expect("tempdir");
        let blob = Arc::new(LocalFsBlobStore::new(blob_root.keep()).await.expect("blob store"));
        let analytics = Arc::new(AnalyticsStore::open_in_memory().expect("analytics store"));
        let processor = Processor::new(
            queue.clone() as Arc<dyn QueueAdapter>,
            blob as Arc<dyn BlobStore>,
            analytics.clone(),
            10,
            Duration::from_millis(10),
        );
        (processor, queue, analytics)
    }

    fn decision_event(step_id: &str, run_id: &str, event_id: &str) -> DecisionEvent {
        DecisionEvent {
            event_id: EventId::new(event_id),
            step_id: StepId::new(step_id),
            run_id: RunId::new(run_id),
            outcome: Outcome::Kept,
            item_id: ItemId::new("item-1"),
            input: Value::Null,
            output: None,
            reason: "kept".to_string(),
            score: None,
            metadata: None,
            timestamp: Timestamp::from_unix_millis(1_700_000_000_000),
        }
    }

    #[tokio::test]
    async fn decision_event_without_a_cached_step_uses_the_unknown_pipeline_id() {
        let (mut processor, queue, analytics) = processor_with_memory_backends().await;
        queue.push_decision_event(decision_event("step-1", "run-1", "evt-1")).await.unwrap();

        let messages = queue.poll(10).await.unwrap();
        for message in messages {
            processor.dispatch_message(message).await;
        }

        let events = analytics.list_decision_events_by_step(&StepId::new("step-1"), 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pipeline_id.as_str(), UNKNOWN_PIPELINE_ID);
    }

    #[tokio::test]
    async fn step_completion_aggregates_its_cached_decision_events() {
        let (mut processor, queue, analytics) = processor_with_memory_backends().await;
        let step = Step::start(
            StepId::new("step-1"),
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            StepType::Filter,
            "filter",
            None,
            Timestamp::from_unix_millis(1_700_000_000_000),
        );
        queue.push_step(step.clone()).await.unwrap();
        queue.push_decision_event(decision_event("step-1", "run-1", "evt-1")).await.unwrap();
        let mut completed = step;
        completed.complete(Timestamp::from_unix_millis(1_700_000_001_000));
        queue.push_step(completed).await.unwrap();

        for message in queue.poll(10).await.unwrap() {
            processor.dispatch_message(message).await;
        }

        let row = analytics.get_step(&StepId::new("step-1")).unwrap().expect("step row");
        assert_eq!(row.input_count, 1);
        assert_eq!(row.kept_count, 1);
    }

    #[tokio::test]
    async fn terminal_run_upserts_a_run_row() {
        let (mut processor, queue, analytics) = processor_with_memory_backends().await;
        let mut run = Run::start(RunId::new("run-1"), PipelineId::new("pipeline-1"), json!({"n": 1}), Timestamp::from_unix_millis(1_700_000_000_000), None);
        run.end(Timestamp::from_unix_millis(1_700_000_002_000), Some(json!({"n": 0})), None);
        queue.push_run(run).await.unwrap();

        for message in queue.poll(10).await.unwrap() {
            processor.dispatch_message(message).await;
        }

        let row = analytics.get_run(&RunId::new("run-1")).unwrap().expect("run row");
        assert_eq!(row.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn non_terminal_run_is_cached_but_not_persisted() {
        let (mut processor, queue, analytics) = processor_with_memory_backends().await;
        let run = Run::start(RunId::new("run-1"), PipelineId::new("pipeline-1"), json!({"n": 1}), Timestamp::from_unix_millis(1_700_000_000_000), None);
        queue.push_run(run).await.unwrap();

        for message in queue.poll(10).await.unwrap() {
            processor.dispatch_message(message).await;
        }

        assert!(analytics.get_run(&RunId::new("run-1")).unwrap().is_none());
    }

    #[tokio::test]
    async fn redelivery_of_an_already_acked_message_id_is_a_no_op() {
        let (mut processor, queue, analytics) = processor_with_memory_backends().await;
        queue.push_decision_event(decision_event("step-1", "run-1", "evt-1")).await.unwrap();
        let message = queue.poll(10).await.unwrap().into_iter().next().expect("one message");
        processor.dispatch_message(message.clone()).await;
        processor.dispatch_message(message).await;

        let events = analytics.list_decision_events_by_step(&StepId::new("step-1"), 10).unwrap();
        assert_eq!(events.len(), 1);
    }
}
