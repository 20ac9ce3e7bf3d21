//! Analysis orchestrator
//!
//! Drives one claimed attempt through
//! `EXTRACT → SEGMENT → PERSIST_SEGMENTS → CLASSIFY → RISK_ANALYZE →
//! GENERATE_SECTIONS → VALIDATE → PERSIST_REPORT → COMPLETE`.
//!
//! Stages run strictly in order and never touch job status themselves. Any
//! error aborts the remaining stages and is settled once, at the boundary in
//! [`Orchestrator::run`]. The lease is renewed between stages; every write
//! is fenced on the attempt number, so a worker whose lease was reaped stops
//! at its next write.

pub mod prompts;
pub mod response;
pub mod stage;

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tenet_core::classifier::{Classification, RuleClassifier};
use tenet_core::domain::job::{Job, JobStatus, Lease};
use tenet_core::domain::report::{
    Overview, Report, ReportItem, ReportSections, RiskAssessment, RiskCategory,
};
use tenet_core::domain::segment::Segment;
use tenet_core::grounding::GroundingValidator;
use tenet_core::segmenter::{Segmenter, SegmenterConfig};
use tenet_store::Stores;
use tracing::{debug, error, info, warn};

use crate::collaborators::Collaborators;
use response::ObligationSections;
pub use stage::{FailureKind, PipelineError, Stage};

/// Tuning for the orchestrator
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub lease_duration: chrono::Duration,
    /// Timeout of each report-stage generation call
    pub generation_timeout: Duration,
    /// Rule confidence below which the generator classifies
    pub classifier_threshold: f64,
    pub segmenter: SegmenterConfig,
}

/// How one invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { code: &'static str },
    /// Lease given back after a transient error
    Released { code: &'static str },
    /// The failure could not be recorded; the lease will lapse
    Unsettled { code: &'static str },
    LeaseLost,
    /// The job was not ours to process
    Skipped(JobStatus),
}

pub struct Orchestrator {
    stores: Stores,
    collaborators: Collaborators,
    segmenter: Segmenter,
    classifier: RuleClassifier,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        stores: Stores,
        collaborators: Collaborators,
        settings: PipelineSettings,
    ) -> anyhow::Result<Self> {
        let segmenter = Segmenter::new(settings.segmenter).context("Invalid segmenter bounds")?;
        let classifier = RuleClassifier::new().context("Failed to build classifier rules")?;

        Ok(Self {
            stores,
            collaborators,
            segmenter,
            classifier,
            settings,
        })
    }

    /// Processes a job claimed by this worker
    ///
    /// Terminal jobs are a no-op, which makes duplicate triggers harmless.
    pub async fn run(&self, job: Job) -> RunOutcome {
        let Some(lease) = job.lease() else {
            debug!("Job {} is {} and not leased, skipping", job.id, job.status);
            return RunOutcome::Skipped(job.status);
        };

        match self.stores.jobs.find_by_id(job.id).await {
            Ok(Some(current)) if current.is_terminal() => {
                info!("Job {} already {}, nothing to do", job.id, current.status);
                return RunOutcome::Skipped(current.status);
            }
            Ok(Some(current)) if current.lease().map(|l| l.attempt) != Some(lease.attempt) => {
                warn!(
                    "Job {} moved on from attempt {} before processing started",
                    job.id, lease.attempt
                );
                return RunOutcome::LeaseLost;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Job {} disappeared before processing started", job.id);
                return RunOutcome::LeaseLost;
            }
            Err(e) => return self.settle(&job, lease, Stage::Extract, e.into()).await,
        }

        info!(
            "Processing job {} (attempt {}, {})",
            job.id, lease.attempt, job.source.filename
        );

        let mut stage = Stage::Extract;
        match self.execute(&job, lease, &mut stage).await {
            Ok(()) => RunOutcome::Completed,
            Err(e) => self.settle(&job, lease, stage, e).await,
        }
    }

    async fn execute(
        &self,
        job: &Job,
        mut lease: Lease,
        stage: &mut Stage,
    ) -> Result<(), PipelineError> {
        *stage = Stage::Extract;
        let bytes = self
            .collaborators
            .storage
            .download(&job.source.storage_path)
            .await?;
        let extracted = self
            .collaborators
            .extraction
            .extract(&bytes, &job.source.filename)
            .await?;
        if extracted.is_blank() {
            return Err(PipelineError::EmptyDocument);
        }
        debug!(
            "Job {}: extracted {} page(s), fallback={}",
            job.id,
            extracted.pages.len(),
            extracted.fallback_used
        );
        lease = self.checkpoint(lease).await?;

        *stage = Stage::Segment;
        let segments = self.segmenter.segment(&extracted.pages);
        if segments.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        *stage = Stage::PersistSegments;
        let written = self.stores.segments.replace_for_job(&lease, &segments).await?;
        info!("Job {}: persisted {} segment(s)", job.id, written);
        lease = self.checkpoint(lease).await?;

        // Later stages work from the persisted rows, not the in-memory copy
        let segments = self.stores.segments.find_by_job(job.id).await?;

        *stage = Stage::Classify;
        let classification = self.classify(job, &extracted.full_text()).await;
        lease = self.checkpoint(lease).await?;

        *stage = Stage::RiskAnalyze;
        let mut risks = Vec::with_capacity(RiskCategory::ALL.len());
        for category in RiskCategory::ALL {
            risks.push(self.analyze_risk(job, category, &segments).await?);
        }
        lease = self.checkpoint(lease).await?;

        *stage = Stage::GenerateSections;
        let summary = self.generate_summary(job, &segments).await?;
        let ObligationSections {
            obligations,
            restrictions,
            termination_triggers,
        } = self.generate_obligations(job, &segments).await?;
        lease = self.checkpoint(lease).await?;

        *stage = Stage::Validate;
        let candidate = ReportSections {
            summary,
            obligations,
            restrictions,
            termination_triggers,
            risks,
        };
        let valid_segments = self.stores.segments.find_by_job(job.id).await?;
        let outcome = GroundingValidator::new(&valid_segments).validate(candidate);
        for violation in &outcome.violations {
            warn!("Job {}: grounding violation, {}", job.id, violation);
        }

        *stage = Stage::PersistReport;
        let report = Report {
            job_id: job.id,
            overview: Overview {
                document_type: classification.document_type.as_str().to_string(),
                classification_confidence: classification.confidence,
                filename: job.source.filename.clone(),
                file_size_bytes: job.source.size_bytes,
                total_segments: valid_segments.len(),
                extraction_fallback_used: extracted.fallback_used,
            },
            sections: outcome.sections,
            violations: outcome.violations,
            created_at: Utc::now(),
        };
        lease = self.checkpoint(lease).await?;
        let report_path = self.export(&report, lease.attempt).await;
        self.stores
            .jobs
            .complete(&lease, &report, report_path.as_deref())
            .await?;

        *stage = Stage::Complete;
        info!(
            "Job {} completed: {} item(s), {} grounding violation(s), type {}",
            job.id,
            report.sections.item_count(),
            report.violations.len(),
            report.overview.document_type
        );
        Ok(())
    }

    async fn checkpoint(&self, lease: Lease) -> Result<Lease, PipelineError> {
        Ok(self
            .stores
            .jobs
            .renew_lease(&lease, self.settings.lease_duration)
            .await?)
    }

    /// Rules first, the generator only below the confidence threshold
    async fn classify(&self, job: &Job, text: &str) -> Classification {
        let rules = self.classifier.classify(text);
        if rules.confidence >= self.settings.classifier_threshold {
            return rules;
        }

        let raw = match self
            .collaborators
            .generator
            .generate(&prompts::classification(text), self.settings.generation_timeout)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Job {}: generator classification failed, keeping rules result: {}",
                    job.id, e
                );
                return rules;
            }
        };

        match response::parse_classification(&raw) {
            Ok(generated) if generated.confidence > rules.confidence => generated,
            Ok(_) => rules,
            Err(e) => {
                warn!("Job {}: unparseable classification response: {}", job.id, e);
                rules
            }
        }
    }

    async fn analyze_risk(
        &self,
        job: &Job,
        category: RiskCategory,
        segments: &[Segment],
    ) -> Result<RiskAssessment, PipelineError> {
        let raw = self
            .collaborators
            .generator
            .generate(
                &prompts::risk(category, segments),
                self.settings.generation_timeout,
            )
            .await?;

        Ok(response::parse_risk(&raw, category).unwrap_or_else(|e| {
            warn!(
                "Job {}: unparseable {} risk response: {}",
                job.id,
                category.key(),
                e
            );
            RiskAssessment::not_detected(category)
        }))
    }

    async fn generate_summary(
        &self,
        job: &Job,
        segments: &[Segment],
    ) -> Result<Vec<ReportItem>, PipelineError> {
        let raw = self
            .collaborators
            .generator
            .generate(&prompts::summary(segments), self.settings.generation_timeout)
            .await?;

        Ok(response::parse_summary(&raw).unwrap_or_else(|e| {
            warn!("Job {}: unparseable summary response: {}", job.id, e);
            Vec::new()
        }))
    }

    async fn generate_obligations(
        &self,
        job: &Job,
        segments: &[Segment],
    ) -> Result<ObligationSections, PipelineError> {
        let raw = self
            .collaborators
            .generator
            .generate(
                &prompts::obligations(segments),
                self.settings.generation_timeout,
            )
            .await?;

        Ok(response::parse_obligations(&raw).unwrap_or_else(|e| {
            warn!("Job {}: unparseable obligations response: {}", job.id, e);
            ObligationSections::default()
        }))
    }

    /// Uploads the report JSON under a per-attempt name so a stale attempt
    /// never overwrites the file a later attempt recorded. Failures leave the
    /// job without an export path.
    async fn export(&self, report: &Report, attempt: i32) -> Option<String> {
        let bytes = match serde_json::to_vec_pretty(report) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Job {}: failed to serialize report export: {}", report.job_id, e);
                return None;
            }
        };

        match self
            .collaborators
            .storage
            .upload(
                report.job_id,
                &format!("report-{}.json", attempt),
                &bytes,
                "application/json",
            )
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Job {}: report export failed: {}", report.job_id, e);
                None
            }
        }
    }

    /// Records the outcome of a failed attempt
    async fn settle(&self, job: &Job, lease: Lease, stage: Stage, err: PipelineError) -> RunOutcome {
        let code = err.code();

        let written = match err.kind() {
            FailureKind::LeaseLost => {
                warn!(
                    "Job {}: lease for attempt {} lost during {}, discarding work",
                    job.id, lease.attempt, stage
                );
                return RunOutcome::LeaseLost;
            }
            FailureKind::Permanent => {
                error!("Job {} failed during {} ({}): {}", job.id, stage, code, err);
                self.stores
                    .jobs
                    .fail(&lease, code, &err.public_message())
                    .await
                    .map(|()| RunOutcome::Failed { code })
            }
            FailureKind::Transient => {
                warn!(
                    "Job {}: transient failure during {} ({}), releasing lease: {}",
                    job.id, stage, code, err
                );
                self.stores
                    .jobs
                    .release(&lease, code, &err.public_message())
                    .await
                    .map(|()| RunOutcome::Released { code })
            }
        };

        match written {
            Ok(outcome) => outcome,
            Err(e) if e.is_lease_lost() => {
                warn!("Job {}: lease lost before the failure could be recorded", job.id);
                RunOutcome::LeaseLost
            }
            Err(e) => {
                error!("Job {}: failed to record failure: {}", job.id, e);
                RunOutcome::Unsettled { code }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tenet_core::domain::job::{SourceDocument, error_code};
    use tenet_core::domain::report::ABSTENTION_TEXT;
    use uuid::Uuid;

    use crate::collaborators::{
        BlobStorage, ContentGenerator, ExtractionChain, GenerationError, MemoryStorage,
        StorageError, StubGenerator,
    };
    use crate::service::Reaper;

    struct DownGenerator;

    #[async_trait]
    impl ContentGenerator for DownGenerator {
        async fn generate(&self, _: &str, _: Duration) -> Result<String, GenerationError> {
            Err(GenerationError::Transport("connection refused".into()))
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            lease_duration: chrono::Duration::minutes(30),
            generation_timeout: Duration::from_secs(1),
            classifier_threshold: 0.9,
            segmenter: SegmenterConfig::default(),
        }
    }

    async fn setup(
        generator: Arc<dyn ContentGenerator>,
        document: Option<&[u8]>,
    ) -> (Orchestrator, Stores, Arc<MemoryStorage>, Job) {
        let stores = Stores::memory();
        let storage = Arc::new(MemoryStorage::new());

        let job_id = Uuid::new_v4();
        let storage_path = match document {
            Some(bytes) => storage
                .upload(job_id, "lease.txt", bytes, "text/plain")
                .await
                .unwrap(),
            None => format!("{}/lease.txt", job_id),
        };
        stores
            .jobs
            .create(SourceDocument {
                storage_path,
                filename: "lease.txt".to_string(),
                size_bytes: document.map_or(0, |d| d.len() as i64),
            })
            .await
            .unwrap();
        let job = stores
            .jobs
            .claim_batch(1, chrono::Duration::minutes(30))
            .await
            .unwrap()
            .remove(0);

        let orchestrator = Orchestrator::new(
            stores.clone(),
            Collaborators {
                storage: storage.clone(),
                extraction: Arc::new(ExtractionChain::local()),
                generator,
            },
            settings(),
        )
        .unwrap();

        (orchestrator, stores, storage, job)
    }

    const LEASE_TEXT: &[u8] = b"RESIDENTIAL LEASE AGREEMENT\n\nThe Tenant shall pay monthly rent to the Landlord on the first day of each month.\n\nThe security deposit is refundable.";

    #[tokio::test]
    async fn test_run_completes_with_grounded_report() {
        let (orchestrator, stores, storage, job) =
            setup(Arc::new(StubGenerator::new()), Some(LEASE_TEXT)).await;

        assert_eq!(orchestrator.run(job.clone()).await, RunOutcome::Completed);

        let stored = stores.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Success);
        assert_eq!(stored.classification.as_deref(), Some("LEASE"));
        assert!(stored.lease_expires_at.is_none());

        let report = stores.reports.find_by_job(job.id).await.unwrap().unwrap();
        assert_eq!(report.sections.summary[0].citations, vec![0]);
        assert_eq!(report.sections.summary[0].page_refs, vec![1]);
        assert_eq!(report.sections.risks.len(), 5);
        assert!(report.sections.risks.iter().all(|r| !r.detected));
        assert!(report.overview.extraction_fallback_used);

        let export = stored.report_path.unwrap();
        assert_eq!(export, format!("{}/report-1.json", job.id));
        assert!(storage.contains(&export));
    }

    /// Holds the first report upload until the test lets it through
    struct GatedStorage {
        inner: MemoryStorage,
        armed: AtomicBool,
        reached: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl BlobStorage for GatedStorage {
        async fn upload(
            &self,
            job_id: Uuid,
            filename: &str,
            bytes: &[u8],
            content_type: &str,
        ) -> Result<String, StorageError> {
            if filename.starts_with("report") && self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
            self.inner.upload(job_id, filename, bytes, content_type).await
        }

        async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.download(path).await
        }
    }

    #[tokio::test]
    async fn test_stale_attempt_cannot_replace_recorded_export() {
        let stores = Stores::memory();
        let storage = Arc::new(GatedStorage {
            inner: MemoryStorage::new(),
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            resume: Notify::new(),
        });

        let job_id = Uuid::new_v4();
        let storage_path = storage
            .upload(job_id, "lease.txt", LEASE_TEXT, "text/plain")
            .await
            .unwrap();
        let created = stores
            .jobs
            .create(SourceDocument {
                storage_path,
                filename: "lease.txt".to_string(),
                size_bytes: LEASE_TEXT.len() as i64,
            })
            .await
            .unwrap();

        let orchestrator = Arc::new(
            Orchestrator::new(
                stores.clone(),
                Collaborators {
                    storage: storage.clone(),
                    extraction: Arc::new(ExtractionChain::local()),
                    generator: Arc::new(StubGenerator::new()),
                },
                settings(),
            )
            .unwrap(),
        );

        let first = stores
            .jobs
            .claim_batch(1, chrono::Duration::minutes(30))
            .await
            .unwrap()
            .remove(0);
        let stale = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(first).await }
        });

        // Attempt 1 is parked inside its export; its lease lapses and attempt 2 finishes
        storage.reached.notified().await;
        let reaper = Reaper::new(stores.jobs.clone(), 3).unwrap();
        let swept = reaper
            .sweep(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(swept.requeued, vec![created.id]);

        let second = stores
            .jobs
            .claim_batch(1, chrono::Duration::minutes(30))
            .await
            .unwrap()
            .remove(0);
        assert_eq!(second.attempt_count, 2);
        assert_eq!(orchestrator.run(second).await, RunOutcome::Completed);

        storage.resume.notify_one();
        assert_eq!(stale.await.unwrap(), RunOutcome::LeaseLost);

        let stored = stores.jobs.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Success);
        let export = stored.report_path.unwrap();
        assert_eq!(export, format!("{}/report-2.json", created.id));

        let persisted = stores.reports.find_by_job(created.id).await.unwrap().unwrap();
        let exported: Report =
            serde_json::from_slice(&storage.download(&export).await.unwrap()).unwrap();
        assert_eq!(exported.created_at, persisted.created_at);
        assert_eq!(exported.job_id, persisted.job_id);

        // The stale upload landed under its own attempt's name
        assert!(storage.inner.contains(&format!("{}/report-1.json", created.id)));
    }

    #[tokio::test]
    async fn test_terminal_job_is_skipped() {
        let (orchestrator, _stores, _storage, job) =
            setup(Arc::new(StubGenerator::new()), Some(LEASE_TEXT)).await;

        assert_eq!(orchestrator.run(job.clone()).await, RunOutcome::Completed);
        assert_eq!(
            orchestrator.run(job).await,
            RunOutcome::Skipped(JobStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_missing_source_fails_permanently() {
        let (orchestrator, stores, _storage, job) =
            setup(Arc::new(StubGenerator::new()), None).await;

        assert_eq!(
            orchestrator.run(job.clone()).await,
            RunOutcome::Failed {
                code: error_code::SOURCE_MISSING
            }
        );

        let stored = stores.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.completed_at.is_some());
        assert!(stores.reports.find_by_job(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_document_fails() {
        let (orchestrator, _stores, _storage, job) =
            setup(Arc::new(StubGenerator::new()), Some(&b"   \n\n  "[..])).await;

        assert_eq!(
            orchestrator.run(job).await,
            RunOutcome::Failed {
                code: error_code::EMPTY_DOCUMENT
            }
        );
    }

    #[tokio::test]
    async fn test_generator_outage_releases_lease() {
        let (orchestrator, stores, _storage, job) =
            setup(Arc::new(DownGenerator), Some(LEASE_TEXT)).await;

        assert_eq!(
            orchestrator.run(job.clone()).await,
            RunOutcome::Released {
                code: error_code::GENERATION_UNAVAILABLE
            }
        );

        let stored = stores.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert!(stored.lease_expires_at.unwrap() <= Utc::now());
        assert_eq!(
            stored.last_error_code.as_deref(),
            Some(error_code::GENERATION_UNAVAILABLE)
        );
        // Segments from the partial attempt stay; no report is written
        assert!(!stores.segments.find_by_job(job.id).await.unwrap().is_empty());
        assert!(stores.reports.find_by_job(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_generator_citations_become_abstentions() {
        struct WrongCitations;

        #[async_trait]
        impl ContentGenerator for WrongCitations {
            async fn generate(&self, prompt: &str, _: Duration) -> Result<String, GenerationError> {
                Ok(match prompts::Task::detect(prompt) {
                    Some(prompts::Task::Summary) => {
                        r#"{"bullets": [{"text": "Rent is due", "chunk_ids": [0, 9]}]}"#.into()
                    }
                    _ => "not json at all".into(),
                })
            }
        }

        let (orchestrator, stores, _storage, job) =
            setup(Arc::new(WrongCitations), Some(LEASE_TEXT)).await;

        assert_eq!(orchestrator.run(job.clone()).await, RunOutcome::Completed);

        let report = stores.reports.find_by_job(job.id).await.unwrap().unwrap();
        assert_eq!(report.sections.summary[0].text, ABSTENTION_TEXT);
        assert!(report.sections.summary[0].citations.is_empty());
        assert_eq!(report.violations.len(), 1);
        assert!(report.sections.obligations.is_empty());
    }
}
