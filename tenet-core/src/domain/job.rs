//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document analysis job
///
/// Created once by the ingestion side in `Pending` and mutated only through
/// the claim, complete, fail, release and reap operations of the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Non-null iff status is `Processing`
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error_code: Option<String>,
    pub error_message: Option<String>,
    pub source: SourceDocument,
    pub classification: Option<String>,
    pub classification_confidence: Option<f64>,
    pub report_path: Option<String>,
}

impl Job {
    /// Builds a fresh pending job for an uploaded document
    pub fn new(source: SourceDocument) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            lease_expires_at: None,
            attempt_count: 0,
            last_error_code: None,
            error_message: None,
            source,
            classification: None,
            classification_confidence: None,
            report_path: None,
        }
    }

    /// Returns the lease held on this job, if it is currently processing
    pub fn lease(&self) -> Option<Lease> {
        match (self.status, self.lease_expires_at) {
            (JobStatus::Processing, Some(expires_at)) => Some(Lease {
                job_id: self.id,
                attempt: self.attempt_count,
                expires_at,
            }),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "SUCCESS" => Some(JobStatus::Success),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the uploaded source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Opaque storage path returned by the storage collaborator
    pub storage_path: String,
    pub filename: String,
    pub size_bytes: i64,
}

/// A time-bounded claim on a job
///
/// The pair `(job_id, attempt)` fences every write a worker makes after
/// claiming: once the reaper requeues the job and another worker claims it,
/// the attempt number moves on and the stale lease no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub job_id: Uuid,
    pub attempt: i32,
    pub expires_at: DateTime<Utc>,
}

/// Stable error codes recorded in `last_error_code`
pub mod error_code {
    pub const SOURCE_MISSING: &str = "SOURCE_MISSING";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
    pub const EXTRACTION_FAILED: &str = "EXTRACTION_FAILED";
    pub const EMPTY_DOCUMENT: &str = "EMPTY_DOCUMENT";
    pub const GENERATION_UNAVAILABLE: &str = "GENERATION_UNAVAILABLE";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
    pub const PROCESSING_ERROR: &str = "PROCESSING_ERROR";
    pub const LEASE_EXPIRED_MAX_ATTEMPTS: &str = "LEASE_EXPIRED_MAX_ATTEMPTS";
}
