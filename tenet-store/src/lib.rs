//! Tenet Store
//!
//! Persistence for jobs, segments, reports and Q&A interactions.
//!
//! Each entity has an `#[async_trait]` store trait with two implementations:
//! - Postgres (`sqlx`), used in deployments
//! - In-memory, with the same transition semantics, used for local runs and tests
//!
//! The backend is picked once at startup through [`Stores`]; callers never
//! branch on which one is active.

pub mod db;
pub mod error;
pub mod memory;
pub mod repository;

use std::sync::Arc;

pub use sqlx::PgPool;

pub use error::{StoreError, StoreResult};
pub use repository::{JobStore, QaStore, ReportStore, SegmentStore};

use crate::memory::MemoryStore;
use crate::repository::{
    job::PgJobStore, qa::PgQaStore, report::PgReportStore, segment::PgSegmentStore,
};

/// The store handles used by the worker
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub segments: Arc<dyn SegmentStore>,
    pub reports: Arc<dyn ReportStore>,
    pub qa: Arc<dyn QaStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            jobs: Arc::new(PgJobStore::new(pool.clone())),
            segments: Arc::new(PgSegmentStore::new(pool.clone())),
            reports: Arc::new(PgReportStore::new(pool.clone())),
            qa: Arc::new(PgQaStore::new(pool)),
        }
    }

    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Wraps an existing in-memory store so tests can keep a handle to it
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            jobs: store.clone(),
            segments: store.clone(),
            reports: store.clone(),
            qa: store,
        }
    }
}
