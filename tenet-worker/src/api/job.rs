//! Job API Handlers
//!
//! Upload, status and report endpoints.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tenet_core::domain::report::Report;
use tenet_core::dto::job::{JobAccepted, JobStatusView};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::job as job_service;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: String,
}

/// POST /job?filename=<name>
/// Store the raw request body and queue a job for it
pub async fn submit_job(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    tracing::info!(
        "Upload received: {} ({} bytes)",
        params.filename,
        body.len()
    );

    let job =
        job_service::submit(&state.stores, state.storage.as_ref(), &params.filename, &body).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// GET /job/{id}
/// Get the status of a job
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobStatusView>> {
    tracing::debug!("Getting job: {}", id);

    let view = job_service::get_status(&state.stores, id).await?;
    Ok(Json(view))
}

/// GET /job/{id}/report
/// Get the validated report of a job
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Report>> {
    tracing::debug!("Getting report for job: {}", id);

    let report = job_service::get_report(&state.stores, id).await?;
    Ok(Json(report))
}
