//! Job Reaper
//!
//! Reclaims jobs whose lease lapsed without completion: a crashed worker, a
//! hung collaborator call, or a lease given back after a transient error.
//! Jobs with attempts left go back to `PENDING`; the rest fail terminally.
//! This is the only place a retry budget is spent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenet_core::domain::job::error_code;
use tenet_store::{JobStore, StoreError};
use thiserror::Error;
use uuid::Uuid;

/// Result of one sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaperReport {
    /// Jobs returned to `PENDING`
    pub requeued: Vec<Uuid>,
    /// Jobs failed with attempts exhausted
    pub failed: Vec<Uuid>,
    /// Jobs that changed under the sweep or could not be updated
    pub skipped: usize,
}

impl ReaperReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty() && self.skipped == 0
    }
}

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("reaper configuration invalid: {0}")]
    InvalidConfig(String),
}

pub struct Reaper {
    jobs: Arc<dyn JobStore>,
    max_attempts: i32,
}

impl Reaper {
    pub fn new(jobs: Arc<dyn JobStore>, max_attempts: i32) -> Result<Self, ReaperError> {
        if max_attempts < 1 {
            return Err(ReaperError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self { jobs, max_attempts })
    }

    /// Requeues or fails every job whose lease expired before `now`
    ///
    /// A failure on one job is logged and counted as skipped; only the
    /// initial scan can fail the sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<ReaperReport, ReaperError> {
        let expired = self.jobs.find_expired(now).await?;
        let mut report = ReaperReport::default();

        for job in expired {
            let requeue = job.attempt_count < self.max_attempts;
            let result = if requeue {
                self.jobs
                    .requeue_expired(job.id, job.attempt_count, now)
                    .await
            } else {
                let message = format!(
                    "Job processing lease expired after {} attempts",
                    job.attempt_count
                );
                self.jobs
                    .fail_expired(
                        job.id,
                        job.attempt_count,
                        now,
                        error_code::LEASE_EXPIRED_MAX_ATTEMPTS,
                        &message,
                    )
                    .await
            };

            match result {
                Ok(true) if requeue => report.requeued.push(job.id),
                Ok(true) => report.failed.push(job.id),
                Ok(false) => {
                    tracing::debug!("Job {} changed during reaping, skipped", job.id);
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to reap job {}: {}", job.id, e);
                    report.skipped += 1;
                }
            }
        }

        for id in &report.requeued {
            tracing::info!("Requeued job {} after lease expiry", id);
        }
        for id in &report.failed {
            tracing::warn!("Failed job {}: lease expired with attempts exhausted", id);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tenet_core::domain::job::{Job, JobStatus, SourceDocument};
    use tenet_store::memory::MemoryStore;

    fn expired_job(attempts: i32, now: DateTime<Utc>) -> Job {
        let mut job = Job::new(SourceDocument {
            storage_path: "x/doc.pdf".to_string(),
            filename: "doc.pdf".to_string(),
            size_bytes: 1,
        });
        job.status = JobStatus::Processing;
        job.started_at = Some(now - Duration::hours(1));
        job.lease_expires_at = Some(now - Duration::minutes(1));
        job.attempt_count = attempts;
        job.last_error_code = Some(error_code::GENERATION_UNAVAILABLE.to_string());
        job
    }

    #[tokio::test]
    async fn test_requeue_and_fail_by_attempt_count() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let retry = expired_job(1, now);
        let exhausted = expired_job(3, now);
        store.put_job(retry.clone());
        store.put_job(exhausted.clone());

        let reaper = Reaper::new(store.clone(), 3).unwrap();
        let report = reaper.sweep(now).await.unwrap();

        assert_eq!(report.requeued, vec![retry.id]);
        assert_eq!(report.failed, vec![exhausted.id]);
        assert_eq!(report.skipped, 0);

        let retried = store.find_by_id(retry.id).await.unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert!(retried.lease_expires_at.is_none());
        assert!(retried.last_error_code.is_none());

        let failed = store.find_by_id(exhausted.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.last_error_code.as_deref(),
            Some(error_code::LEASE_EXPIRED_MAX_ATTEMPTS)
        );
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_live_leases_untouched() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let mut live = expired_job(1, now);
        live.lease_expires_at = Some(now + Duration::minutes(10));
        store.put_job(live.clone());

        let report = Reaper::new(store.clone(), 3).unwrap().sweep(now).await.unwrap();

        assert!(report.is_empty());
        let job = store.find_by_id(live.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_invalid_max_attempts() {
        assert!(Reaper::new(Arc::new(MemoryStore::new()), 0).is_err());
    }
}
