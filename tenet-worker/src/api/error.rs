//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tenet_store::StoreError;

use crate::service::QaError;
use crate::service::job::JobError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    TooManyRequests(String),
    Timeout(String),
    Unavailable(String),
    StoreError(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Unavailable(msg) => {
                tracing::warn!("Collaborator unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            ApiError::StoreError(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            other => ApiError::StoreError(other),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            JobError::NotReady(status) => {
                ApiError::NotFound(format!("Report not available, job is {}", status))
            }
            JobError::ValidationError(msg) => ApiError::BadRequest(msg),
            JobError::StorageError(err) => ApiError::Unavailable(err.to_string()),
            JobError::StoreError(err) => ApiError::StoreError(err),
        }
    }
}

impl From<QaError> for ApiError {
    fn from(err: QaError) -> Self {
        match err {
            QaError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            QaError::NotReady(_) => ApiError::Conflict(err.to_string()),
            QaError::Validation(msg) => ApiError::BadRequest(msg),
            QaError::LimitReached(_) => ApiError::TooManyRequests(err.to_string()),
            QaError::Timeout => ApiError::Timeout(err.to_string()),
            QaError::Generation(e) => ApiError::Unavailable(e.to_string()),
            QaError::Store(e) => ApiError::from(e),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
