// crates/decipipe-queue/src/http.rs
// ============================================================================
// Module: HTTP-Fronted Queue
// Description: QueueAdapter that talks to a broker over plain HTTP.
// Purpose: Cover brokers that expose a REST front end rather than a native
//          client library.
// Dependencies: reqwest, decipipe-model
// ============================================================================

//! ## Overview
//! [`HttpQueue`] POSTs `{type, data}` envelopes to `{base_url}/enqueue` and
//! polls `{base_url}/poll?batchSize=N`, acknowledging via
//! `POST {base_url}/ack/{message_id}`. The wire shape is intentionally the
//! same envelope C6 already accepts from SDKs, so a broker's HTTP front
//! end can be implemented as a thin re-exposure of the ingestion schema.

use async_trait::async_trait;
use decipipe_model::DecisionEvent;
use decipipe_model::EventEnvelope;
use decipipe_model::Run;
use decipipe_model::Step;
use serde::Deserialize;
use serde::Serialize;

use crate::QueueAdapter;
use crate::QueueError;
use crate::QueueMessage;

#[derive(Serialize, Deserialize)]
struct WireMessage {
    message_id: String,
    envelope: EventEnvelope,
}

/// HTTP-fronted [`QueueAdapter`].
pub struct HttpQueue {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQueue {
    /// Builds an adapter targeting `base_url` (trailing slashes trimmed).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn enqueue(&self, envelope: EventEnvelope) -> Result<(), QueueError> {
        let response = self
            .client
            .post(format!("{}/enqueue", self.base_url))
            .json(&envelope)
            .send()
            .await
            .map_err(|err| QueueError::Unreachable(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(QueueError::Rejected(format!("status {}", response.status())))
        }
    }
}

#[async_trait]
impl QueueAdapter for HttpQueue {
    async fn push_decision_event(&self, event: DecisionEvent) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Decision(event)).await
    }

    async fn push_decision_events(&self, events: Vec<DecisionEvent>) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Decisions(events)).await
    }

    async fn push_run(&self, run: Run) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Run(Box::new(run))).await
    }

    async fn push_step(&self, step: Step) -> Result<(), QueueError> {
        self.enqueue(EventEnvelope::Step(Box::new(step))).await
    }

    async fn poll(&self, batch_size: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let response = self
            .client
            .get(format!("{}/poll", self.base_url))
            .query(&[("batchSize", batch_size.to_string())])
            .send()
            .await
            .map_err(|err| QueueError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(QueueError::Unreachable(format!("status {}", response.status())));
        }
        let body: PollBody = response
            .json()
            .await
            .map_err(|err| QueueError::Unreachable(err.to_string()))?;
        Ok(body
            .messages
            .into_iter()
            .map(|message| QueueMessage {
                message_id: message.message_id,
                envelope: message.envelope,
            })
            .collect())
    }

    async fn ack(&self, message_id: &str) -> Result<(), QueueError> {
        let response = self
            .client
            .post(format!("{}/ack/{message_id}", self.base_url))
            .send()
            .await
            .map_err(|err| QueueError::Unreachable(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else if response.status().as_u16() == 404 {
            Err(QueueError::UnknownMessage(message_id.to_string()))
        } else {
            Err(QueueError::Rejected(format!("status {}", response.status())))
        }
    }
}

#[derive(Deserialize)]
struct PollBody {
    messages: Vec<WireMessage>,
}
