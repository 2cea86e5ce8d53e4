use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use energy_client::domain::{parse_timestamp, EnergyReading, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::sinks::{ReadingStore, StoreError};

#[derive(Clone)]
struct QueryState {
    store: Arc<dyn ReadingStore>,
}

#[derive(Debug, Deserialize)]
pub struct RecordsParams {
    pub site_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnomaliesParams {
    pub site_id: String,
}

#[derive(Debug, Serialize)]
struct RecordsResponse {
    count: usize,
    records: Vec<EnergyReading>,
}

#[derive(Debug, Serialize)]
struct AnomaliesResponse {
    count: usize,
    anomalies: Vec<EnergyReading>,
}

#[derive(thiserror::Error, Debug)]
enum QueryError {
    #[error("invalid {field} `{value}`")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::InvalidTimestamp { .. } => StatusCode::BAD_REQUEST,
            QueryError::Store(StoreError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Store(StoreError::Permanent(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "query failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Read-only views over stored readings: `/records`, `/anomalies`, `/health`.
pub fn routes(store: Arc<dyn ReadingStore>) -> Router {
    Router::new()
        .route("/records", get(get_records))
        .route("/anomalies", get(get_anomalies))
        .route("/health", get(health))
        .with_state(QueryState { store })
}

fn parse_bound(field: &'static str, value: Option<&str>) -> Result<Option<OffsetDateTime>, QueryError> {
    value
        .map(|v| {
            parse_timestamp(v).map_err(|_| QueryError::InvalidTimestamp {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}

/// The window applies only when both bounds are given.
fn requested_range(params: &RecordsParams) -> Result<Option<TimeRange>, QueryError> {
    let start = parse_bound("start_time", params.start_time.as_deref())?;
    let end = parse_bound("end_time", params.end_time.as_deref())?;
    Ok(match (start, end) {
        (Some(start), Some(end)) => Some(TimeRange::new(start, end)),
        _ => None,
    })
}

async fn get_records(
    State(state): State<QueryState>,
    Query(params): Query<RecordsParams>,
) -> Result<Json<RecordsResponse>, QueryError> {
    let range = requested_range(&params)?;
    let records = state.store.query(&params.site_id, range).await?;
    Ok(Json(RecordsResponse {
        count: records.len(),
        records,
    }))
}

async fn get_anomalies(
    State(state): State<QueryState>,
    Query(params): Query<AnomaliesParams>,
) -> Result<Json<AnomaliesResponse>, QueryError> {
    let anomalies = state.store.anomalies(&params.site_id).await?;
    tracing::info!(site_id = %params.site_id, count = anomalies.len(), "anomalies fetched");
    Ok(Json(AnomaliesResponse {
        count: anomalies.len(),
        anomalies,
    }))
}

async fn health() -> &'static str {
    "ok"
}
