// crates/decipipe-query/src/lib.rs
// ============================================================================
// Crate: decipipe-query
// Description: The read-only query HTTP service (C10).
// Purpose: `GET /runs`, `GET /runs/:id`, `GET /steps/:id/details`, each
//          backed by one analytical-store read with optional opt-in blob
//          hydration.
// ============================================================================

//! ## Overview
//! Default responses never touch the blob store: only `include_raw=true`
//! triggers a [`decipipe_blobstore::BlobStore::get`] per row, and a
//! missing blob degrades gracefully (the `rawPayload` field is simply
//! omitted and a warning logged) rather than failing the request. The
//! router follows `decipipe-ingestion`'s axum `Router`/`State` shape; the
//! error envelope (`{success:false, error}`) mirrors ingestion's
//! validation-error body for one consistent wire contract across both
//! HTTP services.

mod responses;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use decipipe_analytics::AnalyticsError;
use decipipe_analytics::AnalyticsStore;
use decipipe_blobstore::BlobStore;
use decipipe_blobstore::BlobStoreError;
use decipipe_model::RunId;
use decipipe_model::StepId;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::responses::DecisionReference;
use crate::responses::RunSummary;
use crate::responses::StepDetails;
use crate::responses::StepSummary;

const DEFAULT_LIST_LIMIT: u32 = 50;
const DEFAULT_DECISION_LIMIT: u32 = 100;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The analytical store every endpoint reads from.
    pub analytics: Arc<AnalyticsStore>,
    /// The blob store opt-in hydration reads from.
    pub blob: Arc<dyn BlobStore>,
}

/// Errors a handler may surface, mapped to the `{success:false, error}`
/// envelope.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// No row matched the requested id.
    #[error("not found: {0}")]
    NotFound(String),
    /// The analytical store failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Analytics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { success: false, error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(Envelope { success: true, data, count: None })).into_response()
}

fn ok_list<T: Serialize>(data: T, count: usize) -> Response {
    (StatusCode::OK, Json(Envelope { success: true, data, count: Some(count) })).into_response()
}

/// Builds the service's router: `GET /runs`, `GET /runs/:id`,
/// `GET /steps/:id/details`, and `GET /health`.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/runs", get(list_runs))
        .route("/runs/{id}", get(get_run))
        .route("/steps/{id}/details", get(get_step_details))
        .route("/health", get(health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Response {
    ok(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ListRunsParams {
    #[serde(default)]
    bad_filter: bool,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_runs(State(state): State<AppState>, Query(params): Query<ListRunsParams>) -> Result<Response, QueryError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let rows = state.analytics.list_runs(params.bad_filter, limit, offset)?;
    let count = rows.len();
    let summaries: Vec<RunSummary> = rows.into_iter().map(RunSummary::from).collect();
    Ok(ok_list(summaries, count))
}

#[derive(Debug, Deserialize)]
struct RunDetailParams {
    #[serde(default)]
    include_raw: bool,
}

async fn get_run(State(state): State<AppState>, Path(id): Path<String>, Query(params): Query<RunDetailParams>) -> Result<Response, QueryError> {
    let run_id = RunId::new(id.clone());
    let row = state.analytics.get_run(&run_id)?.ok_or_else(|| QueryError::NotFound(format!("run {id}")))?;
    let step_rows = state.analytics.list_steps_by_run(&run_id)?;

    let mut steps = Vec::with_capacity(step_rows.len());
    for step_row in step_rows {
        let mut summary = StepSummary::from(step_row);
        if params.include_raw {
            summary.raw_payload = fetch_raw(&state, &step_blob_key(&summary)).await;
        }
        steps.push(summary);
    }

    let mut summary = RunSummary::from(row);
    if params.include_raw {
        summary.raw_payload = fetch_raw(&state, &run_blob_key(&summary)).await;
    }
    summary.steps = Some(steps);
    Ok(ok(summary))
}

#[derive(Debug, Deserialize)]
struct StepDetailsParams {
    #[serde(default)]
    include_raw: bool,
    decision_limit: Option<u32>,
}

async fn get_step_details(State(state): State<AppState>, Path(id): Path<String>, Query(params): Query<StepDetailsParams>) -> Result<Response, QueryError> {
    let step_id = StepId::new(id.clone());
    let row = state.analytics.get_step(&step_id)?.ok_or_else(|| QueryError::NotFound(format!("step {id}")))?;
    let limit = params.decision_limit.unwrap_or(DEFAULT_DECISION_LIMIT);
    let event_rows = state.analytics.list_decision_events_by_step(&step_id, limit)?;

    let mut decisions = Vec::with_capacity(event_rows.len());
    for event_row in event_rows {
        let mut reference = DecisionReference::from(event_row);
        if params.include_raw {
            reference.raw_payload = fetch_raw(&state, &reference.blob_key.clone()).await;
        }
        decisions.push(reference);
    }

    let mut step = StepSummary::from(row);
    if params.include_raw {
        step.raw_payload = fetch_raw(&state, &step_blob_key(&step)).await;
    }
    Ok(ok(StepDetails { step, decisions }))
}

/// Partitioned blob keys are a pure function of entity fields the summary
/// already carries, so they are recomputed here rather than stored
/// redundantly on the row.
fn run_blob_key(run: &RunSummary) -> String {
    let (year, month, day) = run.started_at.date_parts();
    format!("runs/{year:04}/{month:02}/{day:02}/{}.json", run.run_id)
}

fn step_blob_key(step: &StepSummary) -> String {
    let (year, month, day) = step.started_at.date_parts();
    format!("steps/{year:04}/{month:02}/{day:02}/{}.json", step.step_id)
}

async fn fetch_raw(state: &AppState, key: &str) -> Option<Value> {
    match state.blob.get(key).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, %key, "blob payload was not valid JSON");
                None
            }
        },
        Ok(None) => {
            warn!(%key, "raw payload requested but blob is missing");
            None
        }
        Err(BlobStoreError::Io(err) | BlobStoreError::Backend(err) | BlobStoreError::Invalid(err)) => {
            warn!(error = %err, %key, "blob store read failed while hydrating raw payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, reason = "Test assertions use expect/unwrap for clarity.")]

    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use decipipe_blobstore::LocalFsBlobStore;
    use decipipe_model::DecisionEvent;
    use decipipe_model::EventId;
    use decipipe_model::ItemId;
    use decipipe_model::Outcome;
    use decipipe_model::PipelineId;
    use decipipe_model::Run;
    use decipipe_model::Step;
    use decipipe_model::StepType;
    use decipipe_model::Timestamp;
    use serde_json::Value;
    use serde_json::json;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;

    async fn seeded_router() -> Router {
        let analytics = AnalyticsStore::open_in_memory().expect("analytics store");
        let dir = tempdir().expect("tempdir");
        let blob = LocalFsBlobStore::new(dir.path()).await.expect("blob store");

        let step = Step::start(
            StepId::new("step-1"),
            RunId::new("run-1"),
            PipelineId::new("pipeline-1"),
            StepType::Filter,
            "filter",
            None,
            Timestamp::from_unix_millis(1_700_000_000_000),
        );
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
            timestamp: Timestamp::from_unix_millis(1_700_000_000_500),
        };
        analytics.insert_decision_event(&event, &PipelineId::new("pipeline-1"), &event.blob_key()).unwrap();
        blob.put_json(&event.blob_key(), &serde_json::to_value(&event).unwrap(), decipipe_blobstore::BlobMetadata::default()).await.unwrap();

        let mut completed_step = step;
        completed_step.complete(Timestamp::from_unix_millis(1_700_000_001_000));
        analytics.upsert_step(&completed_step, std::slice::from_ref(&event)).unwrap();

        let mut run = Run::start(RunId::new("run-1"), PipelineId::new("pipeline-1"), json!({"n": 1}), Timestamp::from_unix_millis(1_700_000_000_000), None);
        run.end(Timestamp::from_unix_millis(1_700_000_002_000), Some(json!({"n": 1})), None);
        let steps = analytics.list_steps_by_run(&RunId::new("run-1")).unwrap();
        analytics.upsert_run(&run, &steps).unwrap();

        let state = AppState { analytics: Arc::new(analytics), blob: Arc::new(blob) };
        build_router(state)
    }

    async fn request(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    #[tokio::test]
    async fn list_runs_returns_the_seeded_run() {
        let (status, body) = request(seeded_router().await, "/runs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["data"][0]["runId"], json!("run-1"));
    }

    #[tokio::test]
    async fn run_detail_includes_step_metrics() {
        let (status, body) = request(seeded_router().await, "/runs/run-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalSteps"], json!(1));
        assert_eq!(body["data"]["steps"][0]["metrics"]["keptCount"], json!(1));
    }

    #[tokio::test]
    async fn unknown_run_is_a_404() {
        let (status, body) = request(seeded_router().await, "/runs/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn step_details_with_include_raw_hydrates_the_decision_payload() {
        let (status, body) = request(seeded_router().await, "/steps/step-1/details?include_raw=true").await;
        assert_eq!(status, StatusCode::OK);
        let decisions = body["data"]["decisions"].as_array().expect("decisions array");
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0]["rawPayload"]["eventId"], json!("evt-1"));
    }

    #[tokio::test]
    async fn step_details_without_include_raw_omits_the_payload() {
        let (status, body) = request(seeded_router().await, "/steps/step-1/details").await;
        assert_eq!(status, StatusCode::OK);
        let decisions = body["data"]["decisions"].as_array().expect("decisions array");
        assert!(decisions[0].get("rawPayload").is_none());
    }
}
