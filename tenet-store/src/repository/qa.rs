//! Q&A Repository
//!
//! Handles all database operations related to Q&A interactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tenet_core::domain::qa::{QaConfidence, QaInteraction};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::repository::QaStore;

pub struct PgQaStore {
    pool: PgPool,
}

impl PgQaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QaStore for PgQaStore {
    async fn record(&self, interaction: &QaInteraction, max_per_job: usize) -> StoreResult<()> {
        let citations: Vec<i32> = interaction.citations.iter().map(|c| *c as i32).collect();

        let mut tx = self.pool.begin().await?;

        // Locking the parent job row serializes concurrent writers for that job
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(interaction.job_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(interaction.job_id));
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qa_interactions WHERE job_id = $1")
            .bind(interaction.job_id)
            .fetch_one(&mut *tx)
            .await?;

        if count as usize >= max_per_job {
            return Err(StoreError::Conflict(format!(
                "question limit of {} reached for job {}",
                max_per_job, interaction.job_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO qa_interactions (id, job_id, question, answer, citations, confidence, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(interaction.id)
        .bind(interaction.job_id)
        .bind(&interaction.question)
        .bind(&interaction.answer)
        .bind(&citations)
        .bind(interaction.confidence.as_str())
        .bind(interaction.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_for_job(&self, job_id: Uuid) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qa_interactions WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    async fn list_for_job(&self, job_id: Uuid) -> StoreResult<Vec<QaInteraction>> {
        let rows = sqlx::query_as::<_, QaRow>(
            r#"
            SELECT id, job_id, question, answer, citations, confidence, created_at
            FROM qa_interactions
            WHERE job_id = $1
            ORDER BY created_at ASC
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
struct QaRow {
    id: Uuid,
    job_id: Uuid,
    question: String,
    answer: String,
    citations: Vec<i32>,
    confidence: String,
    created_at: DateTime<Utc>,
}

impl From<QaRow> for QaInteraction {
    fn from(row: QaRow) -> Self {
        QaInteraction {
            id: row.id,
            job_id: row.job_id,
            question: row.question,
            answer: row.answer,
            citations: row.citations.into_iter().map(|c| c as u32).collect(),
            confidence: QaConfidence::parse(&row.confidence),
            created_at: row.created_at,
        }
    }
}
