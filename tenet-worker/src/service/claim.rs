//! Job Claim Service
//!
//! The only path that moves a job from `PENDING` to `PROCESSING`. Both the
//! poll loop and the push trigger go through the store's conditional claim,
//! so a job handed out once is never handed out again for the same attempt.

use std::sync::Arc;

use tenet_core::domain::job::{Job, JobStatus};
use tenet_store::{JobStore, StoreError, StoreResult};
use uuid::Uuid;

/// Result of claiming a job named by a push trigger
#[derive(Debug, Clone)]
pub enum TriggerClaim {
    Claimed(Job),
    /// The job was no longer pending; a duplicate or late delivery
    AlreadyHandled(JobStatus),
}

#[derive(Clone)]
pub struct ClaimService {
    jobs: Arc<dyn JobStore>,
    lease_duration: chrono::Duration,
}

impl ClaimService {
    pub fn new(jobs: Arc<dyn JobStore>, lease_duration: chrono::Duration) -> Self {
        Self {
            jobs,
            lease_duration,
        }
    }

    /// Claims up to `limit` pending jobs, oldest first
    pub async fn claim_batch(&self, limit: usize) -> StoreResult<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let jobs = self.jobs.claim_batch(limit, self.lease_duration).await?;
        for job in &jobs {
            tracing::info!("Claimed job {} (attempt {})", job.id, job.attempt_count);
        }

        Ok(jobs)
    }

    /// Claims one job if it is still pending
    ///
    /// Returns `AlreadyHandled` with the current status otherwise, and
    /// `StoreError::NotFound` if the job does not exist.
    pub async fn claim_for_trigger(&self, id: Uuid) -> StoreResult<TriggerClaim> {
        if let Some(job) = self.jobs.claim(id, self.lease_duration).await? {
            tracing::info!(
                "Claimed job {} from trigger (attempt {})",
                job.id,
                job.attempt_count
            );
            return Ok(TriggerClaim::Claimed(job));
        }

        let status = self
            .jobs
            .find_by_id(id)
            .await?
            .map(|job| job.status)
            .ok_or(StoreError::NotFound(id))?;

        tracing::info!("Trigger for job {} ignored, job is {}", id, status);
        Ok(TriggerClaim::AlreadyHandled(status))
    }
}
