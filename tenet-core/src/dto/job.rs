//! Job DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobStatus};

/// "Job queued" notification delivered at least once by the ingestion side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueued {
    pub job_id: Uuid,
    pub storage_path: String,
}

/// Response to an accepted upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Externally visible job status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub classification: Option<String>,
    pub classification_confidence: Option<f64>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        // Only terminal failures surface a message to callers
        let error_message = match job.status {
            JobStatus::Failed => job.error_message.clone(),
            _ => None,
        };

        Self {
            job_id: job.id,
            status: job.status,
            filename: job.source.filename.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message,
            classification: job.classification.clone(),
            classification_confidence: job.classification_confidence,
        }
    }
}

/// Acknowledgement of a push trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAck {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub outcome: TriggerOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The trigger claimed the job and ran the pipeline to this status
    Processed { status: JobStatus },
    /// The job was not pending; duplicate or late delivery
    Ignored { status: JobStatus },
}
