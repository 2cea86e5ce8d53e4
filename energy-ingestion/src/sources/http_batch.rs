use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use crate::pipeline::BatchOrchestrator;

#[derive(Clone)]
struct IngestState {
    orchestrator: Arc<BatchOrchestrator>,
}

/// `POST /ingest/:batch_id` and `POST /ingest` (id derived from the payload).
///
/// Both answer with the batch outcome, or 400 when the batch is malformed.
pub fn routes(orchestrator: Arc<BatchOrchestrator>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/ingest", post(ingest_anonymous))
        .route("/ingest/:batch_id", post(ingest_named))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(IngestState { orchestrator })
}

/// Content-derived batch id, stable across resubmissions of the same payload.
pub fn batch_id_for_payload(payload: &[u8]) -> String {
    let hash = blake3::hash(payload);
    format!("batch-{}", &hash.to_hex().as_str()[..16])
}

async fn ingest_named(
    State(state): State<IngestState>,
    Path(batch_id): Path<String>,
    body: Bytes,
) -> Response {
    run_batch(&state, &batch_id, &body).await
}

async fn ingest_anonymous(State(state): State<IngestState>, body: Bytes) -> Response {
    let batch_id = batch_id_for_payload(&body);
    run_batch(&state, &batch_id, &body).await
}

async fn run_batch(state: &IngestState, batch_id: &str, body: &[u8]) -> Response {
    metrics::counter!("http_ingest_requests_total").increment(1);

    match state.orchestrator.ingest(batch_id, body).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            metrics::counter!("http_ingest_failed_total").increment(1);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "batch_id": batch_id, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
