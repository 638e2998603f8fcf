// crates/decipipe-ingestion/src/lib.rs
// ============================================================================
// Crate: decipipe-ingestion
// Description: The validate-and-forward HTTP service (C6).
// Purpose: `POST /ingest` envelope validation plus a `GET /health` probe,
//          holding no database of its own.
// ============================================================================

//! ## Overview
//! This service is pure validate-and-forward: every accepted payload is
//! pushed to a [`decipipe_queue::QueueAdapter`] and nothing is persisted
//! here. `decisions` (batch) is handled outside
//! [`decipipe_model::RawEnvelope::into_typed`] so each element can be
//! validated independently and a partially valid batch still queues the
//! valid elements: the all-or-nothing array decode `into_typed` performs
//! for every other variant would reject the whole batch on one bad
//! element.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use decipipe_model::DecisionEvent;
use decipipe_model::EventEnvelope;
use decipipe_model::RawEnvelope;
use decipipe_model::Timestamp;
use decipipe_queue::QueueAdapter;
use decipipe_queue::QueueError;
use serde_json::Value;
use serde_json::json;

/// Shared state handed to every handler: just the queue adapter handle.
#[derive(Clone)]
pub struct AppState {
    /// Where validated envelopes are enqueued.
    pub queue: Arc<dyn QueueAdapter>,
}

/// Builds the service's router: `POST /ingest` and `GET /health`.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/health", get(health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Timestamp::now().as_unix_millis() }))
}

async fn ingest(State(state): State<AppState>, body: Result<Json<RawEnvelope>, JsonRejection>) -> Response {
    let raw = match body {
        Ok(Json(raw)) => raw,
        Err(rejection) => return validation_error(rejection.to_string(), None),
    };

    if raw.r#type.as_deref() == Some("decisions") {
        return ingest_decisions_batch(&state, raw.data).await;
    }

    match raw.into_typed() {
        Ok(envelope) => match dispatch_single(&state, envelope).await {
            Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "queued": true }))).into_response(),
            Err(err) => enqueue_error(err),
        },
        Err(err) => validation_error(err.to_string(), None),
    }
}

async fn ingest_decisions_batch(state: &AppState, data: Option<Value>) -> Response {
    let Some(Value::Array(elements)) = data else {
        return validation_error("`data` for type `decisions` must be a JSON array".to_string(), None);
    };
    let total = elements.len();
    let mut valid = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<DecisionEvent>(element) {
            Ok(event) => valid.push(event),
            Err(err) => failures.push(format!("element {index}: {err}")),
        }
    }
    let queued = valid.len();
    if queued == 0 {
        return validation_error(
            "batch contained zero valid decision events".to_string(),
            Some(Value::Array(failures.into_iter().map(Value::String).collect())),
        );
    }

    match state.queue.push_decision_events(valid).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "queued": queued, "total": total, "partial": queued < total })),
        )
            .into_response(),
        Err(err) => enqueue_error(err),
    }
}

async fn dispatch_single(state: &AppState, envelope: EventEnvelope) -> Result<(), QueueError> {
    match envelope {
        EventEnvelope::Decision(event) => state.queue.push_decision_event(event).await,
        EventEnvelope::Decisions(events) => state.queue.push_decision_events(events).await,
        EventEnvelope::Run(run) => state.queue.push_run(*run).await,
        EventEnvelope::Step(step) => state.queue.push_step(*step).await,
    }
}

fn validation_error(message: String, details: Option<Value>) -> Response {
    let mut body = json!({ "success": false, "error": message });
    if let Some(details) = details {
        body["details"] = details;
    }
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn enqueue_error(error: QueueError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "success": false, "error": error.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use axum::body::Body;
    use axum::http::Request;
    use decipipe_queue::InMemoryQueue;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn router_with_memory_queue() -> Router {
        build_router(AppState { queue: Arc::new(InMemoryQueue::new()) })
    }

    async fn post_json(router: Router, body: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ingest")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = router_with_memory_queue();
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_type_and_data_is_rejected() {
        let (status, body) = post_json(router_with_memory_queue(), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], Value::Bool(false));
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let (status, _body) = post_json(router_with_memory_queue(), json!({"type": "bogus", "data": {}})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_run_is_queued() {
        let payload = json!({
            "type": "run",
            "data": {
                "runId": "run-1",
                "pipelineId": "pipeline-1",
                "status": "running",
                "input": {},
                "startedAt": 0,
            }
        });
        let (status, body) = post_json(router_with_memory_queue(), payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queued"], Value::Bool(true));
    }

    #[tokio::test]
    async fn partial_decisions_batch_reports_partial_true() {
        let valid_event = json!({
            "eventId": "evt-1",
            "stepId": "step-1",
            "runId": "run-1",
            "outcome": "kept",
            "itemId": "item-1",
            "input": {},
            "reason": "ok",
            "timestamp": 0,
        });
        let payload = json!({ "type": "decisions", "data": [valid_event, {"bogus": true}] });
        let (status, body) = post_json(router_with_memory_queue(), payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queued"], Value::from(1));
        assert_eq!(body["total"], Value::from(2));
        assert_eq!(body["partial"], Value::Bool(true));
    }

    #[tokio::test]
    async fn decisions_batch_with_zero_valid_elements_is_rejected() {
        let payload = json!({ "type": "decisions", "data": [{"bogus": true}] });
        let (status, body) = post_json(router_with_memory_queue(), payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], Value::Bool(false));
    }
}
