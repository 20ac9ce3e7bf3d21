//! Retention sweep
//!
//! Deletes terminal jobs older than the retention window. Segments, reports
//! and Q&A rows go with them. Jobs still pending or processing are never
//! touched, whatever their age.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tenet_store::{JobStore, StoreResult};

pub struct RetentionSweep {
    jobs: Arc<dyn JobStore>,
    retention: Duration,
}

impl RetentionSweep {
    pub fn new(jobs: Arc<dyn JobStore>, retention_days: u32) -> Self {
        Self {
            jobs,
            retention: Duration::days(i64::from(retention_days)),
        }
    }

    /// Returns the number of jobs deleted
    pub async fn sweep(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let cutoff = now - self.retention;
        let deleted = self.jobs.purge_terminal_before(cutoff).await?;

        if deleted > 0 {
            tracing::info!(
                "Retention sweep deleted {} job(s) created before {}",
                deleted,
                cutoff
            );
        }
        Ok(deleted)
    }
}
