//! Ingestion trigger
//!
//! Push delivery of "job queued" notifications. Delivery is at least once:
//! the handler claims through the same conditional claim as the poller and
//! acknowledges anything it did not claim as a no-op.

use axum::{Json, extract::State};
use tenet_core::dto::job::{JobQueued, TriggerAck, TriggerOutcome};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::TriggerClaim;

/// POST /internal/job/process
/// Claim the job and wait for the pipeline run to finish
pub async fn process_job(
    State(state): State<AppState>,
    Json(msg): Json<JobQueued>,
) -> ApiResult<Json<TriggerAck>> {
    let job = match state.claims.claim_for_trigger(msg.job_id).await? {
        TriggerClaim::Claimed(job) => job,
        TriggerClaim::AlreadyHandled(status) => {
            return Ok(Json(TriggerAck {
                job_id: msg.job_id,
                outcome: TriggerOutcome::Ignored { status },
            }));
        }
    };

    if job.source.storage_path != msg.storage_path {
        tracing::warn!(
            "Trigger for job {} names a different storage path, using the stored one",
            job.id
        );
    }

    // The run lives on its own task so a dropped request cannot abandon it mid-stage
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move { orchestrator.run(job).await })
        .await
        .map_err(|e| ApiError::InternalError(format!("Run of job {} aborted: {}", msg.job_id, e)))?;
    tracing::info!("Triggered run of job {} ended: {:?}", msg.job_id, outcome);

    let status = state
        .stores
        .jobs
        .find_by_id(msg.job_id)
        .await?
        .map(|job| job.status)
        .ok_or_else(|| {
            ApiError::InternalError(format!("Job {} vanished during processing", msg.job_id))
        })?;

    Ok(Json(TriggerAck {
        job_id: msg.job_id,
        outcome: TriggerOutcome::Processed { status },
    }))
}
