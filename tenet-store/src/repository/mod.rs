//! Repository Module
//!
//! Store traits, one per entity, and their Postgres implementations.
//!
//! Every write a worker makes after claiming a job takes the [`Lease`] it was
//! handed and succeeds only while the job is still `PROCESSING` under the
//! same attempt number; otherwise it fails with [`StoreError::LeaseLost`].
//!
//! [`StoreError::LeaseLost`]: crate::error::StoreError::LeaseLost

pub mod job;
pub mod qa;
pub mod report;
pub mod segment;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tenet_core::domain::job::{Job, Lease, SourceDocument};
use tenet_core::domain::qa::QaInteraction;
use tenet_core::domain::report::Report;
use tenet_core::domain::segment::Segment;
use uuid::Uuid;

use crate::error::StoreResult;

/// Job records and their atomic state transitions
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new `PENDING` job for an uploaded document
    async fn create(&self, source: SourceDocument) -> StoreResult<Job>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Claims up to `limit` pending jobs, oldest first
    ///
    /// Each returned job is `PROCESSING` with a fresh lease and an incremented
    /// attempt count. Concurrent callers never receive the same job.
    ///
    /// # Arguments
    /// * `limit` - Maximum number of jobs to claim
    /// * `lease` - Lease length granted to each claimed job
    async fn claim_batch(&self, limit: usize, lease: Duration) -> StoreResult<Vec<Job>>;

    /// Claims one specific job if it is still pending
    ///
    /// Returns `None` when the job exists but is not `PENDING`.
    async fn claim(&self, id: Uuid, lease: Duration) -> StoreResult<Option<Job>>;

    /// Extends a held lease to `now + duration`
    async fn renew_lease(&self, lease: &Lease, duration: Duration) -> StoreResult<Lease>;

    /// Persists the validated report and marks the job `SUCCESS` atomically
    ///
    /// # Arguments
    /// * `lease` - The lease the report was produced under
    /// * `report` - The validated report; its overview carries the classification
    /// * `report_path` - Storage path of the exported report, if the export succeeded
    async fn complete(
        &self,
        lease: &Lease,
        report: &Report,
        report_path: Option<&str>,
    ) -> StoreResult<()>;

    /// Marks the job `FAILED` with an error code and message
    async fn fail(&self, lease: &Lease, code: &str, message: &str) -> StoreResult<()>;

    /// Gives the lease up early after a transient failure
    ///
    /// The job stays `PROCESSING` with its lease expiring now, so the reaper
    /// decides between requeue and terminal failure on its next sweep.
    async fn release(&self, lease: &Lease, code: &str, message: &str) -> StoreResult<()>;

    /// Processing jobs whose lease expired before `now`
    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>>;

    /// Returns an expired job to `PENDING`, clearing its lease and error code
    ///
    /// Returns false if the job changed since it was read.
    async fn requeue_expired(&self, id: Uuid, attempt: i32, now: DateTime<Utc>)
    -> StoreResult<bool>;

    /// Terminally fails an expired job
    ///
    /// Returns false if the job changed since it was read.
    async fn fail_expired(
        &self,
        id: Uuid,
        attempt: i32,
        now: DateTime<Utc>,
        code: &str,
        message: &str,
    ) -> StoreResult<bool>;

    /// Deletes terminal jobs created before `cutoff`, with their dependents
    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Segments of a job, unique per `(job, index)`
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Replaces all segments of the leased job
    ///
    /// Existing rows are deleted before inserting, so re-running segmentation
    /// never duplicates an index.
    async fn replace_for_job(&self, lease: &Lease, segments: &[Segment]) -> StoreResult<usize>;

    /// Segments of a job ordered by index
    async fn find_by_job(&self, job_id: Uuid) -> StoreResult<Vec<Segment>>;
}

/// Validated reports, written once by [`JobStore::complete`]
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find_by_job(&self, job_id: Uuid) -> StoreResult<Option<Report>>;
}

/// Recorded Q&A interactions
#[async_trait]
pub trait QaStore: Send + Sync {
    /// Records an interaction unless the job already has `max_per_job`
    ///
    /// Fails with `StoreError::Conflict` when the limit is reached.
    async fn record(&self, interaction: &QaInteraction, max_per_job: usize) -> StoreResult<()>;

    async fn count_for_job(&self, job_id: Uuid) -> StoreResult<usize>;

    async fn list_for_job(&self, job_id: Uuid) -> StoreResult<Vec<QaInteraction>>;
}
