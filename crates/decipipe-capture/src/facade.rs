// crates/decipipe-capture/src/facade.rs
// ============================================================================
// Module: Capture Façade
// Description: The integrator-facing entry point (C5): start a run, wrap a
//              step, end a run.
// Purpose: Tie the buffer, transport, sampler, and decision-derivation
//          algorithm together behind three calls that never alter an
//          application's control flow.
// Dependencies: decipipe-model, decipipe-sampler, parking_lot, tokio
// ============================================================================

//! ## Overview
//! [`CaptureClient`] is what an application actually imports. `start_run`
//! opens a run, `step` wraps one pipeline stage's closure and derives its
//! decision events, and `end_run` closes the run out. None of the three
//! block on network I/O; the only blocking call in this crate is
//! [`CaptureClient::flush`], intended for graceful shutdown.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use decipipe_model::EventId;
use decipipe_model::ItemId;
use decipipe_model::PipelineId;
use decipipe_model::Run;
use decipipe_model::RunId;
use decipipe_model::Step;
use decipipe_model::StepId;
use decipipe_model::StepType;
use decipipe_model::Timestamp;
use parking_lot::Mutex;
use serde_json::Value;

use crate::buffer::EventBuffer;
use crate::buffer::EventBufferConfig;
use crate::config::CaptureConfig;
use crate::derive::DecisionCallback;
use crate::derive::DeriveInput;
use crate::derive::derive_decision_events;
use crate::observer::CaptureObserver;
use crate::observer::NoopObserver;
use crate::transport::Transport;

/// The capture SDK's integrator-facing entry point.
pub struct CaptureClient {
    buffer: Arc<EventBuffer<Arc<Transport>>>,
    transport: Arc<Transport>,
    runs: Mutex<HashMap<RunId, Run>>,
    capture_level: decipipe_sampler::CaptureLevel,
    observer: Arc<dyn CaptureObserver>,
}

fn random_id(prefix: &str) -> String {
    format!("{prefix}-{:032x}", rand::random::<u128>())
}

impl CaptureClient {
    /// Builds a client from a [`CaptureConfig`], starting its background
    /// flush timer immediately.
    #[must_use]
    pub fn new(config: CaptureConfig) -> Arc<Self> {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Builds a client with an explicit [`CaptureObserver`].
    #[must_use]
    pub fn with_observer(config: CaptureConfig, observer: Arc<dyn CaptureObserver>) -> Arc<Self> {
        let transport =
            Transport::with_observer(config.ingestion_url, config.transport, Arc::clone(&observer));
        let buffer_config = EventBufferConfig {
            max_size: config.buffer.max_size,
            batch_size: config.buffer.batch_size,
            flush_interval: config.buffer.flush_interval,
        };
        let buffer =
            EventBuffer::with_observer(buffer_config, Arc::clone(&transport), Arc::clone(&observer));
        Arc::new(Self {
            buffer,
            transport,
            runs: Mutex::new(HashMap::new()),
            capture_level: config.capture_level,
            observer,
        })
    }

    /// Opens a run, returning its freshly minted identifier. Fire-and-forget
    /// sends a `Run` snapshot to the collector.
    pub fn start_run(&self, pipeline_id: impl Into<PipelineId>, input: Value) -> RunId {
        let run_id = RunId::new(random_id("run"));
        let run = Run::start(run_id.clone(), pipeline_id.into(), input, Timestamp::now(), None);
        self.runs.lock().insert(run_id.clone(), run.clone());
        self.send_run_snapshot(run);
        run_id
    }

    /// Wraps one pipeline step. Runs `body`, derives decision events from
    /// `input`/its return value, enqueues them on the buffer, and
    /// propagates `body`'s own error untouched. Observability failures
    /// never surface here; only `body`'s own `Result` does.
    pub fn step<F, E>(
        &self,
        run_id: &RunId,
        step_type: StepType,
        name: impl Into<String>,
        config: Option<BTreeMap<String, Value>>,
        input: Value,
        body: F,
    ) -> Result<Value, E>
    where
        F: FnOnce(&Value) -> Result<Value, E>,
    {
        self.step_with_decisions(run_id, step_type, name, config, input, body, None)
    }

    /// As [`CaptureClient::step`], but with caller-supplied decision logic
    /// instead of automatic derivation.
    pub fn step_with_decisions<F, E>(
        &self,
        run_id: &RunId,
        step_type: StepType,
        name: impl Into<String>,
        config: Option<BTreeMap<String, Value>>,
        input: Value,
        body: F,
        callback: Option<&dyn DecisionCallback>,
    ) -> Result<Value, E>
    where
        F: FnOnce(&Value) -> Result<Value, E>,
    {
        let step_id = StepId::new(random_id("step"));
        let started_at = Timestamp::now();
        let pipeline_id = self
            .runs
            .lock()
            .get(run_id)
            .map_or_else(|| PipelineId::new(String::new()), |run| run.pipeline_id.clone());
        let mut step = Step::start(
            step_id.clone(),
            run_id.clone(),
            pipeline_id,
            step_type,
            name.into(),
            config.clone(),
            started_at,
        );
        self.send_step_snapshot(step.clone());

        let result = body(&input);

        let completed_at = Timestamp::now();
        step.complete(completed_at);
        self.send_step_snapshot(step);

        let Ok(output) = &result else {
            return result;
        };

        let derive_input = DeriveInput {
            step_id: &step_id,
            run_id,
            step_type,
            config: config.as_ref(),
            input: &input,
            output,
            capture_level: self.capture_level,
            callback,
            now: completed_at,
        };
        let events = derive_decision_events(&derive_input, || EventId::new(random_id("evt")));
        for event in events {
            self.buffer.add(event);
        }

        result
    }

    /// Closes a run out with its final status, sending a final `Run`
    /// snapshot. Unknown `run_id`s are ignored — the application's own
    /// control flow is authoritative, not this SDK's bookkeeping.
    pub fn end_run(&self, run_id: &RunId, output: Option<Value>, error: Option<String>) {
        let completed_at = Timestamp::now();
        let Some(mut run) = self.runs.lock().remove(run_id) else {
            return;
        };
        run.end(completed_at, output, error);
        self.send_run_snapshot(run);
    }

    /// Blocks until every buffered decision event has been handed to the
    /// transport. Intended for graceful shutdown; not required in steady
    /// state, since the buffer flushes itself on size and time triggers.
    pub async fn flush(&self) {
        self.buffer.force_flush().await;
    }

    fn send_run_snapshot(&self, run: Run) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            transport.send_run(run).await;
        });
    }

    fn send_step_snapshot(&self, step: Step) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            transport.send_step(step).await;
        });
    }
}

/// Resolves the identity-field value the façade stamps onto single-item
/// steps that bypass derivation entirely (e.g. an early-return guard).
/// Exposed for callers building their own [`DecisionCallback`]s.
#[must_use]
pub fn default_item_id() -> ItemId {
    ItemId::new("single-item")
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use decipipe_sampler::CaptureLevel;
    use serde_json::json;

    use super::*;
    use crate::config::BufferConfig;
    use crate::config::TransportConfig;
    use crate::observer::CaptureObserver;

    fn test_config() -> CaptureConfig {
        CaptureConfig {
            ingestion_url: "http://127.0.0.1:1".to_string(),
            capture_level: CaptureLevel::Full,
            buffer: BufferConfig {
                max_size: 100,
                batch_size: 100,
                flush_interval: Duration::from_secs(3600),
            },
            transport: TransportConfig {
                max_retries: 0,
                retry_delay: Duration::from_millis(1),
                timeout: Duration::from_millis(50),
            },
        }
    }

    #[tokio::test]
    async fn step_propagates_body_error_untouched() {
        let client = CaptureClient::new(test_config());
        let run_id = client.start_run("pipeline-1", json!({}));
        let result: Result<Value, String> = client.step(
            &run_id,
            StepType::Transform,
            "risky",
            None,
            json!({"a": 1}),
            |_input| Err("boom".to_string()),
        );
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[derive(Default)]
    struct CountingObserver {
        transport_failures: AtomicUsize,
    }

    impl CaptureObserver for CountingObserver {
        fn on_transport_failure(&self, _envelope_type: &'static str, _batch_len: usize) {
            self.transport_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn step_completes_and_sends_its_final_snapshot_even_when_body_errors() {
        let observer = Arc::new(CountingObserver::default());
        let client = CaptureClient::with_observer(test_config(), Arc::clone(&observer));
        let run_id = client.start_run("pipeline-1", json!({}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        observer.transport_failures.store(0, Ordering::SeqCst);

        let result: Result<Value, String> = client.step(
            &run_id,
            StepType::Transform,
            "risky",
            None,
            json!({"a": 1}),
            |_input| Err("boom".to_string()),
        );
        assert_eq!(result.unwrap_err(), "boom");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            observer.transport_failures.load(Ordering::SeqCst),
            2,
            "expected both the step-start and step-completion snapshots to be sent even though the body errored"
        );
    }

    #[tokio::test]
    async fn step_derives_events_and_buffers_them() {
        let client = CaptureClient::new(test_config());
        let run_id = client.start_run("pipeline-1", json!([]));
        let input = json!([{"id": "a", "score": 0.9}, {"id": "b", "score": 0.1}]);
        let output = json!([{"id": "a", "score": 0.9}]);
        let result: Result<Value, String> = client.step(
            &run_id,
            StepType::Filter,
            "filter-low-score",
            None,
            input,
            move |_| Ok(output.clone()),
        );
        assert!(result.is_ok());
        assert_eq!(client.buffer.len(), 2);
        client.flush().await;
        assert!(client.buffer.is_empty());
    }

    #[tokio::test]
    async fn end_run_on_unknown_run_id_does_not_panic() {
        let client = CaptureClient::new(test_config());
        client.end_run(&RunId::new("unknown"), None, None);
    }
}
