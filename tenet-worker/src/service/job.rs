//! Job Service
//!
//! Upload intake and read access to job status and reports.

use tenet_core::domain::job::{Job, JobStatus, SourceDocument};
use tenet_core::domain::report::Report;
use tenet_core::dto::job::JobStatusView;
use tenet_store::{StoreError, Stores};
use uuid::Uuid;

use crate::collaborators::{BlobStorage, StorageError};

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(Uuid),
    /// The job exists but has no report yet
    NotReady(JobStatus),
    ValidationError(String),
    StorageError(StorageError),
    StoreError(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => JobError::NotFound(id),
            other => JobError::StoreError(other),
        }
    }
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        JobError::StorageError(err)
    }
}

/// Store an uploaded document and create its pending job
pub async fn submit(
    stores: &Stores,
    storage: &dyn BlobStorage,
    filename: &str,
    bytes: &[u8],
) -> Result<Job, JobError> {
    validate_upload(filename, bytes)?;

    // Storage paths are opaque, so the object gets its own id
    let storage_path = storage
        .upload(Uuid::new_v4(), filename, bytes, content_type(bytes))
        .await?;

    let job = stores
        .jobs
        .create(SourceDocument {
            storage_path,
            filename: filename.to_string(),
            size_bytes: bytes.len() as i64,
        })
        .await?;

    tracing::info!(
        "Job created: {} for {} ({} bytes)",
        job.id,
        job.source.filename,
        job.source.size_bytes
    );

    Ok(job)
}

/// Get the externally visible status of a job
pub async fn get_status(stores: &Stores, id: Uuid) -> Result<JobStatusView, JobError> {
    let job = stores
        .jobs
        .find_by_id(id)
        .await?
        .ok_or(JobError::NotFound(id))?;

    Ok(JobStatusView::from(&job))
}

/// Get the validated report of a job
pub async fn get_report(stores: &Stores, id: Uuid) -> Result<Report, JobError> {
    let job = stores
        .jobs
        .find_by_id(id)
        .await?
        .ok_or(JobError::NotFound(id))?;

    stores
        .reports
        .find_by_job(id)
        .await?
        .ok_or(JobError::NotReady(job.status))
}

/// Checks an upload before anything is stored
pub fn validate_upload(filename: &str, bytes: &[u8]) -> Result<(), JobError> {
    if filename.trim().is_empty() {
        return Err(JobError::ValidationError(
            "filename cannot be empty".to_string(),
        ));
    }

    if bytes.is_empty() {
        return Err(JobError::ValidationError(
            "document cannot be empty".to_string(),
        ));
    }

    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(JobError::ValidationError(format!(
            "document exceeds {} bytes",
            MAX_UPLOAD_BYTES
        )));
    }

    Ok(())
}

fn content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        "application/pdf"
    } else if std::str::from_utf8(bytes).is_ok() {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}
