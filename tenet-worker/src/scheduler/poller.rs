//! Job poller
//!
//! Claims pending jobs on a fixed interval and runs each through the
//! orchestrator in its own task. Claims never exceed the free pipeline
//! slots, so a claimed job starts right away and its lease is not spent
//! waiting in a local queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use tenet_core::domain::job::Job;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::pipeline::{Orchestrator, RunOutcome};
use crate::service::ClaimService;

/// Job poller that continuously claims and processes jobs
pub struct JobPoller {
    claims: ClaimService,
    orchestrator: Arc<Orchestrator>,
    semaphore: Arc<Semaphore>,
    max_parallel_jobs: usize,
    poll_interval: Duration,
    batch_size: usize,
}

impl JobPoller {
    /// Creates a new job poller
    ///
    /// # Arguments
    /// * `claims` - Claim service used for every batch
    /// * `orchestrator` - Pipeline run for each claimed job
    /// * `max_parallel_jobs` - Pipelines allowed to run at once
    /// * `poll_interval` - Time between claim attempts
    /// * `batch_size` - Upper bound of jobs claimed per cycle
    pub fn new(
        claims: ClaimService,
        orchestrator: Arc<Orchestrator>,
        max_parallel_jobs: usize,
        poll_interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            claims,
            orchestrator,
            semaphore: Arc::new(Semaphore::new(max_parallel_jobs)),
            max_parallel_jobs,
            poll_interval,
            batch_size,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) {
        info!("Starting job poller (interval: {:?})", self.poll_interval);

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.poll_once().await {
                Ok(started) => {
                    if started > 0 {
                        info!("Started {} job(s) this cycle", started);
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }
        }
    }

    /// Performs a single poll cycle and returns the number of jobs started
    pub async fn poll_once(&self) -> Result<usize> {
        let free = self.semaphore.available_permits().min(self.batch_size);
        if free == 0 {
            debug!("All pipeline slots busy, skipping poll");
            return Ok(0);
        }

        let jobs = self
            .claims
            .claim_batch(free)
            .await
            .context("Failed to claim pending jobs")?;

        if jobs.is_empty() {
            debug!("No pending jobs");
            return Ok(0);
        }

        let started = jobs.len();
        for job in jobs {
            // Only this poller takes permits, so these never wait
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .context("Pipeline semaphore closed")?;
            self.spawn_job_task(job, permit);
        }

        Ok(started)
    }

    /// Spawns a task to process a single job
    fn spawn_job_task(&self, job: Job, permit: OwnedSemaphorePermit) {
        let orchestrator = Arc::clone(&self.orchestrator);

        tokio::spawn(async move {
            let job_id = job.id;
            match orchestrator.run(job).await {
                RunOutcome::Completed => debug!("Job {} finished", job_id),
                RunOutcome::Unsettled { code } => {
                    warn!("Job {} left to the reaper after {}", job_id, code)
                }
                outcome => debug!("Job {} ended with {:?}", job_id, outcome),
            }
            drop(permit);
        });
    }

    /// Waits until every running pipeline has finished
    pub async fn drain(&self) {
        let all = u32::try_from(self.max_parallel_jobs).unwrap_or(u32::MAX);
        if let Ok(permits) = self.semaphore.acquire_many(all).await {
            drop(permits);
        }
    }
}
