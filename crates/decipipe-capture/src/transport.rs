// crates/decipipe-capture/src/transport.rs
// ============================================================================
// Module: Transport
// Description: Retry/backoff HTTP sender that never surfaces errors (C4).
// Purpose: Be the SDK's error wall — every DNS, connection, 5xx, or
//          partial-body failure resolves to silence from the caller's
//          perspective, because the caller has already moved on.
// Dependencies: reqwest, decipipe-model, tracing
// ============================================================================

//! ## Overview
//! [`Transport`] sends `{type, data}` envelopes to `POST {apiUrl}/ingest`.
//! Non-2xx responses are retried with exponential backoff up to
//! `max_retries` attempts; a per-attempt timeout is treated as
//! non-retryable, since retrying past a caller's latency budget would
//! defeat the point of a timeout. All three public send methods return
//! nothing observable on failure; failures are logged at `debug`.

use std::sync::Arc;
use std::time::Duration;

use decipipe_model::DecisionEvent;
use decipipe_model::EventEnvelope;
use decipipe_model::Run;
use decipipe_model::Step;
use serde::Serialize;

use crate::buffer::DecisionSink;
use crate::config::TransportConfig;
use crate::observer::CaptureObserver;
use crate::observer::NoopObserver;

/// Sends envelopes to the ingestion collector, swallowing all failures.
pub struct Transport {
    client: reqwest::Client,
    ingest_url: String,
    config: TransportConfig,
    observer: Arc<dyn CaptureObserver>,
}

impl Transport {
    /// Builds a transport targeting `{ingestion_url}/ingest`.
    #[must_use]
    pub fn new(ingestion_url: impl Into<String>, config: TransportConfig) -> Arc<Self> {
        Self::with_observer(ingestion_url, config, Arc::new(NoopObserver))
    }

    /// Builds a transport with an explicit [`CaptureObserver`].
    #[must_use]
    pub fn with_observer(
        ingestion_url: impl Into<String>,
        config: TransportConfig,
        observer: Arc<dyn CaptureObserver>,
    ) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            client,
            ingest_url: format!("{}/ingest", ingestion_url.into().trim_end_matches('/')),
            config,
            observer,
        })
    }

    /// Best-effort send of a single decision event.
    pub async fn send_decision_event(&self, event: DecisionEvent) {
        self.send_envelope(EventEnvelope::Decision(event), "decision", 1)
            .await;
    }

    /// Best-effort send of a batch of decision events.
    pub async fn send_decision_events(&self, events: Vec<DecisionEvent>) {
        let len = events.len();
        self.send_envelope(EventEnvelope::Decisions(events), "decisions", len)
            .await;
    }

    /// Best-effort send of a run snapshot.
    pub async fn send_run(&self, run: Run) {
        self.send_envelope(EventEnvelope::Run(Box::new(run)), "run", 1)
            .await;
    }

    /// Best-effort send of a step snapshot.
    pub async fn send_step(&self, step: Step) {
        self.send_envelope(EventEnvelope::Step(Box::new(step)), "step", 1)
            .await;
    }

    async fn send_envelope(&self, envelope: EventEnvelope, type_name: &'static str, len: usize) {
        if self.attempt_delivery(&envelope).await {
            return;
        }
        tracing::debug!(envelope_type = type_name, batch_len = len, "ingest delivery failed after retries");
        self.observer.on_transport_failure(type_name, len);
    }

    /// Runs the bounded-retry delivery loop. Returns `true` once any
    /// attempt succeeds.
    async fn attempt_delivery<T>(&self, body: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match tokio::time::timeout(self.config.timeout, self.send_once(body)).await {
                Ok(Ok(true)) => return true,
                Ok(Ok(false)) => {
                    tracing::debug!(attempt, "ingest responded with a non-2xx status");
                }
                Ok(Err(err)) => {
                    tracing::debug!(attempt, error = %err, "ingest request failed");
                }
                Err(_) => {
                    tracing::debug!(attempt, "ingest request timed out; not retrying further");
                    return false;
                }
            }
        }
        false
    }

    /// Performs a single HTTP attempt. `Ok(true)` on a 2xx response,
    /// `Ok(false)` on any other status (retryable), `Err` on a transport
    /// (connection/DNS) failure (also retryable, from the caller's loop).
    async fn send_once<T>(&self, body: &T) -> Result<bool, reqwest::Error>
    where
        T: Serialize + ?Sized,
    {
        let response = self.client.post(&self.ingest_url).json(body).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait::async_trait]
impl DecisionSink for Arc<Transport> {
    async fn send_decision_events(&self, batch: Vec<DecisionEvent>) {
        Transport::send_decision_events(self, batch).await;
    }
}

#[cfg(test)]
mod tests {
    use decipipe_model::EventId;
    use decipipe_model::ItemId;
    use decipipe_model::Outcome;
    use decipipe_model::RunId;
    use decipipe_model::StepId;
    use decipipe_model::Timestamp;
    use serde_json::Value;

    use super::*;

    #[tokio::test]
    async fn send_to_unreachable_host_never_panics_or_blocks_forever() {
        let config = TransportConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        };
        let transport = Transport::new("http://127.0.0.1:1", config);
        let event = DecisionEvent {
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
        };
        transport.send_decision_event(event).await;
    }
}
