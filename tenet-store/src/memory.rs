//! In-memory store
//!
//! Implements every store trait over a single mutex. Each operation runs
//! under the lock, which gives the same atomicity the Postgres store gets
//! from conditional updates and row locks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tenet_core::domain::job::{Job, JobStatus, Lease, SourceDocument};
use tenet_core::domain::qa::QaInteraction;
use tenet_core::domain::report::Report;
use tenet_core::domain::segment::Segment;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::repository::{JobStore, QaStore, ReportStore, SegmentStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    segments: HashMap<Uuid, Vec<Segment>>,
    reports: HashMap<Uuid, Report>,
    qa: Vec<QaInteraction>,
}

impl Inner {
    /// The job row, only if the lease still matches it
    fn held(&mut self, lease: &Lease) -> StoreResult<&mut Job> {
        match self.jobs.get_mut(&lease.job_id) {
            Some(job) if job.status == JobStatus::Processing && job.attempt_count == lease.attempt => {
                Ok(job)
            }
            _ => Err(StoreError::LeaseLost(lease.job_id)),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a job row as-is
    pub fn put_job(&self, job: Job) {
        self.lock().jobs.insert(job.id, job);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn claim_pending(job: &mut Job, now: DateTime<Utc>, lease: Duration) {
    job.status = JobStatus::Processing;
    job.started_at = Some(now);
    job.updated_at = now;
    job.lease_expires_at = Some(now + lease);
    job.attempt_count += 1;
}

fn is_expired(job: &Job, attempt: i32, now: DateTime<Utc>) -> bool {
    job.status == JobStatus::Processing
        && job.attempt_count == attempt
        && job.lease_expires_at.is_some_and(|t| t < now)
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, source: SourceDocument) -> StoreResult<Job> {
        let job = Job::new(source);
        self.lock().jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn claim_batch(&self, limit: usize, lease: Duration) -> StoreResult<Vec<Job>> {
        let now = Utc::now();
        let mut inner = self.lock();

        let mut pending: Vec<(DateTime<Utc>, Uuid)> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| (j.created_at, j.id))
            .collect();
        pending.sort();

        let mut claimed = Vec::new();
        for (_, id) in pending.into_iter().take(limit) {
            if let Some(job) = inner.jobs.get_mut(&id) {
                claim_pending(job, now, lease);
                claimed.push(job.clone());
            }
        }

        Ok(claimed)
    }

    async fn claim(&self, id: Uuid, lease: Duration) -> StoreResult<Option<Job>> {
        let mut inner = self.lock();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.status != JobStatus::Pending {
            return Ok(None);
        }

        claim_pending(job, Utc::now(), lease);
        Ok(Some(job.clone()))
    }

    async fn renew_lease(&self, lease: &Lease, duration: Duration) -> StoreResult<Lease> {
        let now = Utc::now();
        let mut inner = self.lock();
        let job = inner.held(lease)?;

        let expires_at = now + duration;
        job.lease_expires_at = Some(expires_at);
        job.updated_at = now;

        Ok(Lease {
            expires_at,
            ..*lease
        })
    }

    async fn complete(
        &self,
        lease: &Lease,
        report: &Report,
        report_path: Option<&str>,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let mut inner = self.lock();

        if inner.reports.contains_key(&lease.job_id) {
            return Err(StoreError::Conflict(format!(
                "report for job {} already exists",
                lease.job_id
            )));
        }

        let job = inner.held(lease)?;
        job.status = JobStatus::Success;
        job.completed_at = Some(now);
        job.updated_at = now;
        job.lease_expires_at = None;
        job.last_error_code = None;
        job.error_message = None;
        job.classification = Some(report.overview.document_type.clone());
        job.classification_confidence = Some(report.overview.classification_confidence);
        job.report_path = report_path.map(str::to_string);

        inner.reports.insert(lease.job_id, report.clone());
        Ok(())
    }

    async fn fail(&self, lease: &Lease, code: &str, message: &str) -> StoreResult<()> {
        let now = Utc::now();
        let mut inner = self.lock();
        let job = inner.held(lease)?;

        job.status = JobStatus::Failed;
        job.completed_at = Some(now);
        job.updated_at = now;
        job.lease_expires_at = None;
        job.last_error_code = Some(code.to_string());
        job.error_message = Some(message.to_string());
        Ok(())
    }

    async fn release(&self, lease: &Lease, code: &str, message: &str) -> StoreResult<()> {
        let now = Utc::now();
        let mut inner = self.lock();
        let job = inner.held(lease)?;

        job.lease_expires_at = Some(now);
        job.updated_at = now;
        job.last_error_code = Some(code.to_string());
        job.error_message = Some(message.to_string());
        Ok(())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let inner = self.lock();
        let mut expired: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| is_expired(j, j.attempt_count, now))
            .cloned()
            .collect();
        expired.sort_by_key(|j| j.lease_expires_at);
        Ok(expired)
    }

    async fn requeue_expired(
        &self,
        id: Uuid,
        attempt: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.jobs.get_mut(&id) {
            Some(job) if is_expired(job, attempt, now) => {
                job.status = JobStatus::Pending;
                job.lease_expires_at = None;
                job.last_error_code = None;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_expired(
        &self,
        id: Uuid,
        attempt: i32,
        now: DateTime<Utc>,
        code: &str,
        message: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.jobs.get_mut(&id) {
            Some(job) if is_expired(job, attempt, now) => {
                job.status = JobStatus::Failed;
                job.lease_expires_at = None;
                job.completed_at = Some(now);
                job.updated_at = now;
                job.last_error_code = Some(code.to_string());
                job.error_message = Some(message.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.lock();

        let doomed: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|j| j.is_terminal() && j.created_at < cutoff)
            .map(|j| j.id)
            .collect();

        for id in &doomed {
            inner.jobs.remove(id);
            inner.segments.remove(id);
            inner.reports.remove(id);
        }
        inner.qa.retain(|q| !doomed.contains(&q.job_id));

        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn replace_for_job(&self, lease: &Lease, segments: &[Segment]) -> StoreResult<usize> {
        let mut inner = self.lock();
        inner.held(lease)?;

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = segments.iter().find(|s| !seen.insert(s.index)) {
            return Err(StoreError::Conflict(format!(
                "duplicate segment index {} for job {}",
                dup.index, lease.job_id
            )));
        }

        let mut rows = segments.to_vec();
        rows.sort_by_key(|s| s.index);
        inner.segments.insert(lease.job_id, rows);
        Ok(segments.len())
    }

    async fn find_by_job(&self, job_id: Uuid) -> StoreResult<Vec<Segment>> {
        Ok(self
            .lock()
            .segments
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find_by_job(&self, job_id: Uuid) -> StoreResult<Option<Report>> {
        Ok(self.lock().reports.get(&job_id).cloned())
    }
}

#[async_trait]
impl QaStore for MemoryStore {
    async fn record(&self, interaction: &QaInteraction, max_per_job: usize) -> StoreResult<()> {
        let mut inner = self.lock();
        if !inner.jobs.contains_key(&interaction.job_id) {
            return Err(StoreError::NotFound(interaction.job_id));
        }
        let count = inner
            .qa
            .iter()
            .filter(|q| q.job_id == interaction.job_id)
            .count();

        if count >= max_per_job {
            return Err(StoreError::Conflict(format!(
                "question limit of {} reached for job {}",
                max_per_job, interaction.job_id
            )));
        }

        inner.qa.push(interaction.clone());
        Ok(())
    }

    async fn count_for_job(&self, job_id: Uuid) -> StoreResult<usize> {
        Ok(self.lock().qa.iter().filter(|q| q.job_id == job_id).count())
    }

    async fn list_for_job(&self, job_id: Uuid) -> StoreResult<Vec<QaInteraction>> {
        Ok(self
            .lock()
            .qa
            .iter()
            .filter(|q| q.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tenet_core::domain::qa::QaConfidence;
    use tenet_core::domain::report::{Overview, ReportSections};

    fn source(name: &str) -> SourceDocument {
        SourceDocument {
            storage_path: format!("jobs/{}", name),
            filename: name.to_string(),
            size_bytes: 10,
        }
    }

    fn segment(index: u32) -> Segment {
        Segment {
            index,
            text: format!("text {}", index),
            page_number: 1,
            start_offset: 0,
            end_offset: 6,
            confidence: 0.9,
        }
    }

    fn report(job_id: Uuid) -> Report {
        Report {
            job_id,
            overview: Overview {
                document_type: "LEASE".to_string(),
                classification_confidence: 0.85,
                filename: "lease.pdf".to_string(),
                file_size_bytes: 10,
                total_segments: 1,
                extraction_fallback_used: false,
            },
            sections: ReportSections::default(),
            violations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn lease_secs(secs: i64) -> Duration {
        Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_claim_batch_oldest_first() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let mut job = Job::new(source(name));
            job.created_at = Utc::now() - Duration::minutes(10 - i as i64);
            ids.push(job.id);
            store.put_job(job);
        }

        let claimed = store.claim_batch(2, lease_secs(60)).await.unwrap();
        let claimed_ids: Vec<Uuid> = claimed.iter().map(|j| j.id).collect();

        assert_eq!(claimed_ids, vec![ids[0], ids[1]]);
        for job in &claimed {
            assert_eq!(job.status, JobStatus::Processing);
            assert_eq!(job.attempt_count, 1);
            assert!(job.lease_expires_at.is_some());
            assert!(job.started_at.is_some());
        }

        let rest = store.claim_batch(5, lease_secs(60)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, ids[2]);
        assert!(store.claim_batch(5, lease_secs(60)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_single_is_conditional() {
        let store = MemoryStore::new();
        let job = store.create(source("a")).await.unwrap();

        assert!(store.claim(job.id, lease_secs(60)).await.unwrap().is_some());
        assert!(store.claim(job.id, lease_secs(60)).await.unwrap().is_none());

        let missing = store.claim(Uuid::new_v4(), lease_secs(60)).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_complete_writes_report_and_clears_lease() {
        let store = MemoryStore::new();
        let job = store.create(source("a")).await.unwrap();
        let claimed = store.claim(job.id, lease_secs(60)).await.unwrap().unwrap();
        let lease = claimed.lease().unwrap();

        store
            .complete(&lease, &report(job.id), Some("reports/a.json"))
            .await
            .unwrap();

        let done = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Success);
        assert!(done.lease_expires_at.is_none());
        assert!(done.completed_at.is_some());
        assert_eq!(done.classification.as_deref(), Some("LEASE"));
        assert_eq!(done.report_path.as_deref(), Some("reports/a.json"));
        assert!(ReportStore::find_by_job(&store, job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_lease_cannot_write() {
        let store = MemoryStore::new();
        let job = store.create(source("a")).await.unwrap();
        let first = store.claim(job.id, lease_secs(-1)).await.unwrap().unwrap();
        let stale = first.lease().unwrap();

        // Reaper requeues, another worker claims attempt 2
        assert!(
            store
                .requeue_expired(job.id, stale.attempt, Utc::now())
                .await
                .unwrap()
        );
        let second = store.claim(job.id, lease_secs(60)).await.unwrap().unwrap();
        assert_eq!(second.attempt_count, 2);

        let err = store.fail(&stale, "X", "late").await.unwrap_err();
        assert!(err.is_lease_lost());
        let err = store.replace_for_job(&stale, &[segment(0)]).await.unwrap_err();
        assert!(err.is_lease_lost());
        let err = store.complete(&stale, &report(job.id), None).await.unwrap_err();
        assert!(err.is_lease_lost());
        assert!(store.renew_lease(&stale, lease_secs(60)).await.is_err());

        let current = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Processing);
        assert!(ReportStore::find_by_job(&store, job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_expires_lease_immediately() {
        let store = MemoryStore::new();
        let job = store.create(source("a")).await.unwrap();
        let lease = store
            .claim(job.id, lease_secs(600))
            .await
            .unwrap()
            .unwrap()
            .lease()
            .unwrap();

        store
            .release(&lease, "STORAGE_UNAVAILABLE", "bucket down")
            .await
            .unwrap();

        let later = Utc::now() + Duration::milliseconds(5);
        let expired = store.find_expired(later).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(
            expired[0].last_error_code.as_deref(),
            Some("STORAGE_UNAVAILABLE")
        );
    }

    #[tokio::test]
    async fn test_reap_transitions_require_expired_lease() {
        let store = MemoryStore::new();
        let job = store.create(source("a")).await.unwrap();
        let claimed = store.claim(job.id, lease_secs(600)).await.unwrap().unwrap();
        let now = Utc::now();

        assert!(store.find_expired(now).await.unwrap().is_empty());
        assert!(!store.requeue_expired(job.id, claimed.attempt_count, now).await.unwrap());
        assert!(
            !store
                .fail_expired(job.id, claimed.attempt_count, now, "X", "y")
                .await
                .unwrap()
        );

        let later = now + Duration::hours(1);
        assert!(!store.requeue_expired(job.id, 99, later).await.unwrap());
        assert!(
            store
                .fail_expired(job.id, claimed.attempt_count, later, "LEASE_EXPIRED_MAX_ATTEMPTS", "gone")
                .await
                .unwrap()
        );

        let failed = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.lease_expires_at.is_none());
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_replace_segments_is_idempotent() {
        let store = MemoryStore::new();
        let job = store.create(source("a")).await.unwrap();
        let lease = store
            .claim(job.id, lease_secs(60))
            .await
            .unwrap()
            .unwrap()
            .lease()
            .unwrap();

        let segments = vec![segment(0), segment(1), segment(2)];
        store.replace_for_job(&lease, &segments).await.unwrap();
        store.replace_for_job(&lease, &segments).await.unwrap();

        let stored = SegmentStore::find_by_job(&store, job.id).await.unwrap();
        assert_eq!(stored, segments);

        let dup = store
            .replace_for_job(&lease, &[segment(0), segment(0)])
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_purge_removes_only_old_terminal_jobs() {
        let store = MemoryStore::new();

        let mut old_done = Job::new(source("old"));
        old_done.status = JobStatus::Success;
        old_done.created_at = Utc::now() - Duration::days(40);
        let mut old_pending = Job::new(source("queued"));
        old_pending.created_at = Utc::now() - Duration::days(40);
        let fresh = Job::new(source("fresh"));

        let old_id = old_done.id;
        store.put_job(old_done);
        store.put_job(old_pending.clone());
        store.put_job(fresh.clone());

        let purged = store
            .purge_terminal_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(store.find_by_id(old_id).await.unwrap().is_none());
        assert!(store.find_by_id(old_pending.id).await.unwrap().is_some());
        assert!(store.find_by_id(fresh.id).await.unwrap().is_some());
    }

    fn interaction(job_id: Uuid, n: usize) -> QaInteraction {
        QaInteraction {
            id: Uuid::new_v4(),
            job_id,
            question: format!("q{}", n),
            answer: "a".to_string(),
            citations: vec![0],
            confidence: QaConfidence::Confident,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_question_limit() {
        let store = MemoryStore::new();
        let job_id = store.create(source("a")).await.unwrap().id;
        let interaction = |n: usize| interaction(job_id, n);

        for n in 0..3 {
            store.record(&interaction(n), 3).await.unwrap();
        }
        let over = store.record(&interaction(3), 3).await;
        assert!(matches!(over, Err(StoreError::Conflict(_))));
        assert_eq!(store.count_for_job(job_id).await.unwrap(), 3);
        assert_eq!(store.list_for_job(job_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_question_for_unknown_job_is_not_found() {
        let store = MemoryStore::new();
        let result = store.record(&interaction(Uuid::new_v4(), 0), 3).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_questions_respect_limit() {
        let store = Arc::new(MemoryStore::new());
        let job_id = store.create(source("a")).await.unwrap().id;

        let handles: Vec<_> = (0..12)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.record(&interaction(job_id, n), 3).await })
            })
            .collect();

        let mut accepted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(StoreError::Conflict(_)) => rejected += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(rejected, 9);
        assert_eq!(store.count_for_job(job_id).await.unwrap(), 3);
    }
}
