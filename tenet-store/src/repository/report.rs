//! Report Repository
//!
//! Read side of the reports table. Reports are written together with job
//! completion in [`PgJobStore`](crate::repository::job::PgJobStore).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tenet_core::domain::report::Report;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::repository::ReportStore;

pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn find_by_job(&self, job_id: Uuid) -> StoreResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT job_id, overview, sections, violations, created_at
            FROM reports
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Report {
                job_id: row.job_id,
                overview: serde_json::from_value(row.overview)?,
                sections: serde_json::from_value(row.sections)?,
                violations: serde_json::from_value(row.violations)?,
                created_at: row.created_at,
            })),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ReportRow {
    job_id: Uuid,
    overview: serde_json::Value,
    sections: serde_json::Value,
    violations: serde_json::Value,
    created_at: DateTime<Utc>,
}
