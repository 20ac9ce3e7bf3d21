//! Job Repository
//!
//! Handles all database operations related to jobs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgExecutor, PgPool};
use tenet_core::domain::job::{Job, JobStatus, Lease, SourceDocument};
use tenet_core::domain::report::Report;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::repository::JobStore;

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, source: SourceDocument) -> StoreResult<Job> {
        let job = Job::new(source);

        sqlx::query(
            r#"
            INSERT INTO jobs (id, status, created_at, updated_at, attempt_count,
                              storage_path, filename, file_size_bytes)
            VALUES ($1, $2, $3, $3, 0, $4, $5, $6)
            "#,
        )
        .bind(job.id)
        .bind(status_to_string(job.status))
        .bind(job.created_at)
        .bind(&job.source.storage_path)
        .bind(&job.source.filename)
        .bind(job.source.size_bytes)
        .execute(&self.pool)
        .await?;

        tracing::info!("Job created: {} ({})", job.id, job.source.filename);

        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, status, created_at, updated_at, started_at, completed_at,
                   lease_expires_at, attempt_count, last_error_code, error_message,
                   storage_path, filename, file_size_bytes, classification,
                   classification_confidence, report_path
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn claim_batch(&self, limit: usize, lease: Duration) -> StoreResult<Vec<Job>> {
        let mut tx = self.pool.begin().await?;

        // Rows locked by a concurrent claimer are skipped, not waited on
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM jobs
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = claim_pending(&mut *tx, id, lease).await? {
                claimed.push(Job::from(row));
            }
        }

        tx.commit().await?;

        for job in &claimed {
            tracing::info!("Job {} claimed (attempt {})", job.id, job.attempt_count);
        }

        Ok(claimed)
    }

    async fn claim(&self, id: Uuid, lease: Duration) -> StoreResult<Option<Job>> {
        match claim_pending(&self.pool, id, lease).await? {
            Some(row) => {
                let job = Job::from(row);
                tracing::info!("Job {} claimed (attempt {})", job.id, job.attempt_count);
                Ok(Some(job))
            }
            None => {
                // Distinguish "not pending" from "does not exist"
                let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM jobs WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                match exists {
                    Some(_) => Ok(None),
                    None => Err(StoreError::NotFound(id)),
                }
            }
        }
    }

    async fn renew_lease(&self, lease: &Lease, duration: Duration) -> StoreResult<Lease> {
        let now = Utc::now();
        let expires_at = now + duration;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $3, updated_at = $4
            WHERE id = $1 AND attempt_count = $2 AND status = 'PROCESSING'
            "#,
        )
        .bind(lease.job_id)
        .bind(lease.attempt)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::LeaseLost(lease.job_id));
        }

        tracing::debug!("Lease on job {} renewed until {}", lease.job_id, expires_at);

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
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'SUCCESS', completed_at = $3, updated_at = $3,
                lease_expires_at = NULL, last_error_code = NULL, error_message = NULL,
                classification = $4, classification_confidence = $5, report_path = $6
            WHERE id = $1 AND attempt_count = $2 AND status = 'PROCESSING'
            "#,
        )
        .bind(lease.job_id)
        .bind(lease.attempt)
        .bind(now)
        .bind(&report.overview.document_type)
        .bind(report.overview.classification_confidence)
        .bind(report_path)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Err(StoreError::LeaseLost(lease.job_id));
        }

        sqlx::query(
            r#"
            INSERT INTO reports (job_id, overview, sections, violations, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(lease.job_id)
        .bind(serde_json::to_value(&report.overview)?)
        .bind(serde_json::to_value(&report.sections)?)
        .bind(serde_json::to_value(&report.violations)?)
        .bind(report.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("report for job {} already exists", lease.job_id))
            }
            other => StoreError::Database(other),
        })?;

        tx.commit().await?;

        tracing::info!(
            "Job {} completed ({} grounding violations)",
            lease.job_id,
            report.violations.len()
        );

        Ok(())
    }

    async fn fail(&self, lease: &Lease, code: &str, message: &str) -> StoreResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', completed_at = $3, updated_at = $3,
                lease_expires_at = NULL, last_error_code = $4, error_message = $5
            WHERE id = $1 AND attempt_count = $2 AND status = 'PROCESSING'
            "#,
        )
        .bind(lease.job_id)
        .bind(lease.attempt)
        .bind(now)
        .bind(code)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::LeaseLost(lease.job_id));
        }

        tracing::info!("Job {} failed: {} ({})", lease.job_id, code, message);

        Ok(())
    }

    async fn release(&self, lease: &Lease, code: &str, message: &str) -> StoreResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $3, updated_at = $3,
                last_error_code = $4, error_message = $5
            WHERE id = $1 AND attempt_count = $2 AND status = 'PROCESSING'
            "#,
        )
        .bind(lease.job_id)
        .bind(lease.attempt)
        .bind(now)
        .bind(code)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::LeaseLost(lease.job_id));
        }

        tracing::info!("Job {} lease released after {}", lease.job_id, code);

        Ok(())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, status, created_at, updated_at, started_at, completed_at,
                   lease_expires_at, attempt_count, last_error_code, error_message,
                   storage_path, filename, file_size_bytes, classification,
                   classification_confidence, report_path
            FROM jobs
            WHERE status = 'PROCESSING' AND lease_expires_at < $1
            ORDER BY lease_expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn requeue_expired(
        &self,
        id: Uuid,
        attempt: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PENDING', lease_expires_at = NULL, last_error_code = NULL,
                updated_at = $3
            WHERE id = $1 AND attempt_count = $2 AND status = 'PROCESSING'
              AND lease_expires_at < $3
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_expired(
        &self,
        id: Uuid,
        attempt: i32,
        now: DateTime<Utc>,
        code: &str,
        message: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', lease_expires_at = NULL, completed_at = $3,
                updated_at = $3, last_error_code = $4, error_message = $5
            WHERE id = $1 AND attempt_count = $2 AND status = 'PROCESSING'
              AND lease_expires_at < $3
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(now)
        .bind(code)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        // Segments, reports and Q&A rows go with the job via ON DELETE CASCADE
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('SUCCESS', 'FAILED') AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Conditional PENDING -> PROCESSING transition; the final guard against double claims
async fn claim_pending<'e, E>(
    executor: E,
    id: Uuid,
    lease: Duration,
) -> Result<Option<JobRow>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let now = Utc::now();

    sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs
        SET status = 'PROCESSING', started_at = $2, updated_at = $2,
            lease_expires_at = $3, attempt_count = attempt_count + 1
        WHERE id = $1 AND status = 'PENDING'
        RETURNING id, status, created_at, updated_at, started_at, completed_at,
                  lease_expires_at, attempt_count, last_error_code, error_message,
                  storage_path, filename, file_size_bytes, classification,
                  classification_confidence, report_path
        "#,
    )
    .bind(id)
    .bind(now)
    .bind(now + lease)
    .fetch_optional(executor)
    .await
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: JobStatus) -> &'static str {
    status.as_str()
}

fn string_to_status(s: &str) -> JobStatus {
    JobStatus::parse(s).unwrap_or_else(|| {
        tracing::warn!("Unknown job status '{}' read from database", s);
        JobStatus::Failed
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    lease_expires_at: Option<DateTime<Utc>>,
    attempt_count: i32,
    last_error_code: Option<String>,
    error_message: Option<String>,
    storage_path: String,
    filename: String,
    file_size_bytes: i64,
    classification: Option<String>,
    classification_confidence: Option<f64>,
    report_path: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            status: string_to_status(&row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            lease_expires_at: row.lease_expires_at,
            attempt_count: row.attempt_count,
            last_error_code: row.last_error_code,
            error_message: row.error_message,
            source: SourceDocument {
                storage_path: row.storage_path,
                filename: row.filename,
                size_bytes: row.file_size_bytes,
            },
            classification: row.classification,
            classification_confidence: row.classification_confidence,
            report_path: row.report_path,
        }
    }
}
