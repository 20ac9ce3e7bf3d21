//! Store error types

use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by every store operation
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entity does not exist
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// The caller's lease no longer matches the job row
    #[error("lease on job {0} is no longer held")]
    LeaseLost(Uuid),

    /// A uniqueness or state constraint rejected the write
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_lease_lost(&self) -> bool {
        matches!(self, Self::LeaseLost(_))
    }

    /// True for failures worth retrying on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
