use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table; a lease exists exactly while the job is processing
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            status VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            lease_expires_at TIMESTAMPTZ,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_error_code VARCHAR(100),
            error_message TEXT,
            storage_path TEXT NOT NULL,
            filename VARCHAR(255) NOT NULL,
            file_size_bytes BIGINT NOT NULL,
            classification VARCHAR(50),
            classification_confidence DOUBLE PRECISION,
            report_path TEXT,
            CONSTRAINT jobs_lease_iff_processing
                CHECK ((status = 'PROCESSING') = (lease_expires_at IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create segments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segments (
            id BIGSERIAL PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            segment_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            confidence DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            CONSTRAINT segments_job_index_unique UNIQUE (job_id, segment_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create reports table (one per job)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            job_id UUID PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
            overview JSONB NOT NULL,
            sections JSONB NOT NULL,
            violations JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create Q&A table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS qa_interactions (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            citations INTEGER[] NOT NULL DEFAULT '{}',
            confidence VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for claim, reaper and retention queries
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status_created_at ON jobs(status, created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_status_lease ON jobs(status, lease_expires_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_qa_interactions_job_id ON qa_interactions(job_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
