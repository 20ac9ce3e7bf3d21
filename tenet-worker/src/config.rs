//! Worker configuration
//!
//! Defines all configurable parameters for the worker including store
//! selection, polling and lease timing, periodic sweeps, collaborator
//! endpoints and segmentation bounds.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tenet_core::segmenter::SegmenterConfig;

/// Worker configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (local dev vs. shared Postgres).
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// HTTP listen address
    pub bind_addr: String,

    /// Whether this process runs the local poll loop
    pub poll_enabled: bool,

    /// How often to poll for pending jobs
    pub poll_interval: Duration,

    /// Maximum jobs claimed per poll cycle
    pub poll_batch_size: usize,

    /// Max pipelines this process runs at once
    pub max_parallel_jobs: usize,

    /// Lease granted on claim and on every renewal
    pub lease_duration: Duration,

    /// How often the reaper sweeps for expired leases
    pub reaper_interval: Duration,

    /// Attempts allowed before the reaper fails a job terminally
    pub max_attempts: i32,

    /// How often the retention sweep runs
    pub retention_interval: Duration,

    /// Age after which terminal jobs are deleted
    pub retention_days: u32,

    /// Root directory of the local blob storage
    pub storage_root: PathBuf,

    /// Primary extraction service; only the local extractor runs when absent
    pub extraction_url: Option<String>,

    pub extraction_timeout: Duration,

    pub generation: GenerationConfig,

    /// Timeout for interactive Q&A generation calls
    pub qa_timeout: Duration,

    /// Questions allowed per job
    pub qa_max_questions: usize,

    /// Rule confidence below which the generator is asked to classify
    pub classifier_threshold: f64,

    pub segmenter: SegmenterConfig,
}

/// Content generation backend settings
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Generation endpoint; the deterministic stub is used when absent
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Timeout for report-stage calls
    pub timeout: Duration,
    /// Attempts per call for retryable HTTP failures
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional; unset or unparseable values keep the
    /// default. See `Config::default` for the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let generation_defaults = GenerationConfig::default();

        Self {
            database_url: env_string("DATABASE_URL"),
            bind_addr: env_string("BIND_ADDR").unwrap_or(defaults.bind_addr),
            poll_enabled: env_parse("POLL_ENABLED").unwrap_or(defaults.poll_enabled),
            poll_interval: env_parse("POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            poll_batch_size: env_parse("POLL_BATCH_SIZE").unwrap_or(defaults.poll_batch_size),
            max_parallel_jobs: env_parse("MAX_PARALLEL_JOBS")
                .unwrap_or(defaults.max_parallel_jobs),
            lease_duration: env_parse("LEASE_DURATION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_duration),
            reaper_interval: env_parse("REAPER_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            max_attempts: env_parse("MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            retention_interval: env_parse("RETENTION_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention_interval),
            retention_days: env_parse("RETENTION_DAYS").unwrap_or(defaults.retention_days),
            storage_root: env_string("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            extraction_url: env_string("EXTRACTION_URL"),
            extraction_timeout: env_parse("EXTRACTION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.extraction_timeout),
            generation: GenerationConfig {
                url: env_string("GENERATION_URL"),
                api_key: env_string("GENERATION_API_KEY"),
                model: env_string("GENERATION_MODEL").unwrap_or(generation_defaults.model),
                timeout: env_parse("GENERATION_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(generation_defaults.timeout),
                max_retries: env_parse("GENERATION_MAX_RETRIES")
                    .unwrap_or(generation_defaults.max_retries),
            },
            qa_timeout: env_parse("QA_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.qa_timeout),
            qa_max_questions: env_parse("QA_MAX_QUESTIONS").unwrap_or(defaults.qa_max_questions),
            classifier_threshold: env_parse("CLASSIFIER_THRESHOLD")
                .unwrap_or(defaults.classifier_threshold),
            segmenter: SegmenterConfig::new(
                env_parse("SEGMENT_MAX_CHARS").unwrap_or(defaults.segmenter.max_chars),
                env_parse("SEGMENT_MIN_CHARS").unwrap_or(defaults.segmenter.min_chars),
            ),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.poll_batch_size == 0 {
            anyhow::bail!("poll_batch_size must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.lease_duration.is_zero() {
            anyhow::bail!("lease_duration must be greater than 0");
        }

        if self.reaper_interval.is_zero() || self.retention_interval.is_zero() {
            anyhow::bail!("sweep intervals must be greater than 0");
        }

        if self.max_attempts < 1 {
            anyhow::bail!("max_attempts must be at least 1");
        }

        if self.retention_days == 0 {
            anyhow::bail!("retention_days must be greater than 0");
        }

        if self.qa_max_questions == 0 {
            anyhow::bail!("qa_max_questions must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.classifier_threshold) {
            anyhow::bail!("classifier_threshold must be within [0, 1]");
        }

        for url in [&self.extraction_url, &self.generation.url]
            .into_iter()
            .flatten()
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("collaborator url must start with http:// or https://: {}", url);
            }
        }

        if self.generation.timeout.is_zero()
            || self.qa_timeout.is_zero()
            || self.extraction_timeout.is_zero()
        {
            anyhow::bail!("collaborator timeouts must be greater than 0");
        }

        self.segmenter.validate()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            poll_enabled: true,
            poll_interval: Duration::from_millis(2000),
            poll_batch_size: 5,
            max_parallel_jobs: 2,
            lease_duration: Duration::from_secs(30 * 60),
            reaper_interval: Duration::from_secs(60),
            max_attempts: 3,
            retention_interval: Duration::from_secs(60 * 60),
            retention_days: 30,
            storage_root: PathBuf::from("./data/storage"),
            extraction_url: None,
            extraction_timeout: Duration::from_secs(60),
            generation: GenerationConfig::default(),
            qa_timeout: Duration::from_secs(3),
            qa_max_questions: 3,
            classifier_threshold: 0.90,
            segmenter: SegmenterConfig::default(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.trim().parse::<T>().ok())
}
