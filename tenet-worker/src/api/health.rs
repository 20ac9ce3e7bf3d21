//! Liveness and readiness probes

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::api::AppState;

/// GET /health
/// Process is up
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /ready
/// Ready once the job store answers a lookup
pub async fn readiness(State(state): State<AppState>) -> Response {
    match state.stores.jobs.find_by_id(Uuid::nil()).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}
