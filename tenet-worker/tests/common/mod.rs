//! Shared fixtures for worker integration tests.
//!
//! Everything runs against the in-memory store and blob storage, with a
//! generator that answers from a script and falls back to the stub.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tenet_core::domain::job::{Job, SourceDocument};
use tenet_core::segmenter::SegmenterConfig;
use tenet_store::Stores;
use tenet_worker::api::AppState;
use tenet_worker::collaborators::{
    BlobStorage, Collaborators, ContentGenerator, ExtractionChain, GenerationError,
    MemoryStorage, StubGenerator,
};
use tenet_worker::pipeline::prompts::Task;
use tenet_worker::pipeline::{Orchestrator, PipelineSettings};
use tenet_worker::service::{ClaimService, QaService};
use uuid::Uuid;

pub const LEASE_MINUTES: i64 = 30;

/// Generator returning canned responses per task
pub struct ScriptedGenerator {
    script: Vec<(Task, String)>,
    fallback: StubGenerator,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            fallback: StubGenerator::new(),
        }
    }

    pub fn respond(mut self, task: Task, response: serde_json::Value) -> Self {
        self.script.push((task, response.to_string()));
        self
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        let task = Task::detect(prompt);
        match self.script.iter().find(|(t, _)| Some(*t) == task) {
            Some((_, response)) => Ok(response.clone()),
            None => self.fallback.generate(prompt, timeout).await,
        }
    }
}

/// Stub generator that takes `delay` to answer each call
pub struct SlowGenerator {
    delay: Duration,
    inner: StubGenerator,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: StubGenerator::new(),
        }
    }
}

#[async_trait]
impl ContentGenerator for SlowGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        tokio::time::sleep(self.delay).await;
        self.inner.generate(prompt, timeout).await
    }
}

/// In-memory worker wiring
pub struct TestHarness {
    pub stores: Stores,
    pub storage: Arc<MemoryStorage>,
    pub generator: Arc<dyn ContentGenerator>,
    pub claims: ClaimService,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_generator(Arc::new(StubGenerator::new()))
    }

    pub fn with_generator(generator: Arc<dyn ContentGenerator>) -> Self {
        let stores = Stores::memory();
        let storage = Arc::new(MemoryStorage::new());
        let lease = chrono::Duration::minutes(LEASE_MINUTES);

        let orchestrator = Orchestrator::new(
            stores.clone(),
            Collaborators {
                storage: storage.clone(),
                extraction: Arc::new(ExtractionChain::local()),
                generator: generator.clone(),
            },
            PipelineSettings {
                lease_duration: lease,
                generation_timeout: Duration::from_secs(1),
                classifier_threshold: 0.9,
                segmenter: SegmenterConfig::default(),
            },
        )
        .expect("orchestrator must build");

        Self {
            claims: ClaimService::new(stores.jobs.clone(), lease),
            stores,
            storage,
            generator,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Stores `bytes` and creates a pending job for them
    pub async fn submit(&self, filename: &str, bytes: &[u8]) -> Job {
        let storage_path = self
            .storage
            .upload(Uuid::new_v4(), filename, bytes, "text/plain")
            .await
            .expect("upload must succeed");

        self.stores
            .jobs
            .create(SourceDocument {
                storage_path,
                filename: filename.to_string(),
                size_bytes: bytes.len() as i64,
            })
            .await
            .expect("job must be created")
    }

    pub async fn job(&self, id: Uuid) -> Job {
        self.stores
            .jobs
            .find_by_id(id)
            .await
            .expect("store must answer")
            .expect("job must exist")
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            stores: self.stores.clone(),
            storage: self.storage.clone(),
            claims: self.claims.clone(),
            orchestrator: self.orchestrator.clone(),
            qa: Arc::new(QaService::new(
                self.stores.clone(),
                self.generator.clone(),
                Duration::from_secs(1),
                3,
            )),
        }
    }
}

/// Roughly `len` characters of prose, without paragraph breaks
pub fn prose(len: usize) -> String {
    "The tenant pays rent on the first day of each month. "
        .repeat(len / 50 + 1)
        .chars()
        .take(len)
        .collect::<String>()
        .trim()
        .to_string()
}
