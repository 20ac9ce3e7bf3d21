//! Pipeline stages and failure classification

use std::fmt;

use tenet_core::domain::job::error_code;
use tenet_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::collaborators::{ExtractionError, GenerationError, StorageError};

/// Stages of one processing attempt, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Segment,
    PersistSegments,
    Classify,
    RiskAnalyze,
    GenerateSections,
    Validate,
    PersistReport,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "EXTRACT",
            Stage::Segment => "SEGMENT",
            Stage::PersistSegments => "PERSIST_SEGMENTS",
            Stage::Classify => "CLASSIFY",
            Stage::RiskAnalyze => "RISK_ANALYZE",
            Stage::GenerateSections => "GENERATE_SECTIONS",
            Stage::Validate => "VALIDATE",
            Stage::PersistReport => "PERSIST_REPORT",
            Stage::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

/// How the orchestrator settles a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Give the lease back; the reaper requeues or fails by attempt count
    Transient,
    /// Fail the job now
    Permanent,
    /// Another attempt owns the job; write nothing
    LeaseLost,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("lease on job {0} lost")]
    LeaseLost(Uuid),

    #[error("source document missing: {0}")]
    SourceMissing(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no text could be extracted")]
    EmptyDocument,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LeaseLost(id) => PipelineError::LeaseLost(id),
            other => PipelineError::Store(other),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) | StorageError::InvalidPath(path) => {
                PipelineError::SourceMissing(path)
            }
            other => PipelineError::Storage(other),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::LeaseLost(_) => FailureKind::LeaseLost,
            PipelineError::SourceMissing(_) | PipelineError::EmptyDocument => FailureKind::Permanent,
            PipelineError::Storage(_) | PipelineError::Generation(_) => FailureKind::Transient,
            PipelineError::Extraction(e) if e.is_transient() => FailureKind::Transient,
            PipelineError::Extraction(_) => FailureKind::Permanent,
            PipelineError::Store(e) if e.is_transient() => FailureKind::Transient,
            PipelineError::Store(_) => FailureKind::Permanent,
        }
    }

    /// Stable code recorded on the job
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::LeaseLost(_) => error_code::PROCESSING_ERROR,
            PipelineError::SourceMissing(_) => error_code::SOURCE_MISSING,
            PipelineError::Storage(_) => error_code::STORAGE_UNAVAILABLE,
            PipelineError::Extraction(_) => error_code::EXTRACTION_FAILED,
            PipelineError::EmptyDocument => error_code::EMPTY_DOCUMENT,
            PipelineError::Generation(_) => error_code::GENERATION_UNAVAILABLE,
            PipelineError::Store(e) if e.is_transient() => error_code::STORE_UNAVAILABLE,
            PipelineError::Store(_) => error_code::PROCESSING_ERROR,
        }
    }

    /// Message safe to show outside the system
    pub fn public_message(&self) -> String {
        let message = match self {
            PipelineError::SourceMissing(_) => "The uploaded document could not be found",
            PipelineError::Storage(_) => "Document storage is temporarily unavailable",
            PipelineError::Extraction(_) => "Text could not be extracted from the document",
            PipelineError::EmptyDocument => "The document contains no extractable text",
            PipelineError::Generation(_) => "The analysis service is temporarily unavailable",
            PipelineError::LeaseLost(_) | PipelineError::Store(_) => {
                "An internal error occurred while processing the document"
            }
        };
        message.to_string()
    }
}
