//! Segment Repository
//!
//! Handles all database operations related to segments.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tenet_core::domain::job::Lease;
use tenet_core::domain::segment::Segment;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::repository::SegmentStore;

pub struct PgSegmentStore {
    pool: PgPool,
}

impl PgSegmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentStore for PgSegmentStore {
    async fn replace_for_job(&self, lease: &Lease, segments: &[Segment]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        // Lock the job row so a concurrent reclaim cannot interleave
        let held: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM jobs
            WHERE id = $1 AND attempt_count = $2 AND status = 'PROCESSING'
            FOR UPDATE
            "#,
        )
        .bind(lease.job_id)
        .bind(lease.attempt)
        .fetch_optional(&mut *tx)
        .await?;

        if held.is_none() {
            return Err(StoreError::LeaseLost(lease.job_id));
        }

        let deleted = sqlx::query("DELETE FROM segments WHERE job_id = $1")
            .bind(lease.job_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() > 0 {
            tracing::debug!(
                "Removed {} segments of job {} from a previous attempt",
                deleted.rows_affected(),
                lease.job_id
            );
        }

        let now = Utc::now();
        for segment in segments {
            sqlx::query(
                r#"
                INSERT INTO segments (job_id, segment_index, text, page_number,
                                      start_offset, end_offset, confidence, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(lease.job_id)
            .bind(segment.index as i32)
            .bind(&segment.text)
            .bind(segment.page_number as i32)
            .bind(segment.start_offset as i32)
            .bind(segment.end_offset as i32)
            .bind(segment.confidence)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(
                    format!("duplicate segment index {} for job {}", segment.index, lease.job_id),
                ),
                other => StoreError::Database(other),
            })?;
        }

        tx.commit().await?;

        tracing::info!("Stored {} segments for job {}", segments.len(), lease.job_id);

        Ok(segments.len())
    }

    async fn find_by_job(&self, job_id: Uuid) -> StoreResult<Vec<Segment>> {
        let rows = sqlx::query_as::<_, SegmentRow>(
            r#"
            SELECT segment_index, text, page_number, start_offset, end_offset, confidence
            FROM segments
            WHERE job_id = $1
            ORDER BY segment_index ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct SegmentRow {
    segment_index: i32,
    text: String,
    page_number: i32,
    start_offset: i32,
    end_offset: i32,
    confidence: f64,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Segment {
            index: row.segment_index as u32,
            text: row.text,
            page_number: row.page_number as u32,
            start_offset: row.start_offset as u32,
            end_offset: row.end_offset as u32,
            confidence: row.confidence,
        }
    }
}
