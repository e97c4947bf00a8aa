use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::data::Observation;
use crate::query::{AggregateOptions, AggregatedObservation, ListOptions, QueryError};
use crate::storage::{ActiveFileInfo, ObservationStore};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<ObservationStore>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub active_file: Option<ActiveFileInfo>,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        active_file: state.store.active_file(),
    })
}

// ============================================================================
// Ingest
// ============================================================================

#[derive(Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(observations): Json<Vec<Observation>>,
) -> (StatusCode, Json<IngestResponse>) {
    let accepted = observations.len();
    for obs in observations {
        state.store.submit(obs).await;
    }

    (StatusCode::ACCEPTED, Json(IngestResponse { accepted }))
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Serialize)]
pub struct ListResponse {
    pub observations: Vec<Observation>,
    pub count: usize,
}

pub async fn list_observations(
    State(state): State<Arc<AppState>>,
    Json(options): Json<ListOptions>,
) -> Result<Json<ListResponse>, ApiError> {
    let store = Arc::clone(&state.store);
    let observations = tokio::task::spawn_blocking(move || store.list_observations(&options))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(ListResponse {
        count: observations.len(),
        observations,
    }))
}

#[derive(Serialize)]
pub struct AggregatedResponse {
    pub aggregated: Vec<AggregatedObservation>,
    pub count: usize,
}

pub async fn aggregated_observations(
    State(state): State<Arc<AppState>>,
    Json(options): Json<AggregateOptions>,
) -> Result<Json<AggregatedResponse>, ApiError> {
    let store = Arc::clone(&state.store);
    let aggregated = tokio::task::spawn_blocking(move || store.aggregated_observations(&options))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(AggregatedResponse {
        count: aggregated.len(),
        aggregated,
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Query(String),
    Internal(String),
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        tracing::warn!(error = %e, "query failed");
        ApiError::Query(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            ApiError::Query(msg) | ApiError::Internal(msg) => msg,
        };

        let body = serde_json::json!({
            "error": message
        });

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
