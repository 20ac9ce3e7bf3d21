use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tenet_store::{PgPool, Stores};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenet_worker::api::{self, AppState};
use tenet_worker::collaborators::{
    Collaborators, ContentGenerator, ExtractionChain, HttpExtractor, HttpGenerator,
    LocalExtractor, LocalStorage, StubGenerator, TextExtractor,
};
use tenet_worker::config::Config;
use tenet_worker::pipeline::{Orchestrator, PipelineSettings};
use tenet_worker::scheduler::{JobPoller, spawn_periodic};
use tenet_worker::service::{ClaimService, QaService, Reaper, RetentionSweep};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tenet_worker=info,tenet_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tenet Worker");

    let config = load_config()?;
    let lease_duration =
        chrono::Duration::from_std(config.lease_duration).context("Lease duration out of range")?;

    let stores = build_stores(&config).await?;
    let collaborators = build_collaborators(&config)?;

    let orchestrator = Arc::new(Orchestrator::new(
        stores.clone(),
        collaborators.clone(),
        PipelineSettings {
            lease_duration,
            generation_timeout: config.generation.timeout,
            classifier_threshold: config.classifier_threshold,
            segmenter: config.segmenter,
        },
    )?);
    let claims = ClaimService::new(stores.jobs.clone(), lease_duration);

    // Periodic sweeps
    let reaper = Arc::new(Reaper::new(stores.jobs.clone(), config.max_attempts)?);
    spawn_periodic("reaper", config.reaper_interval, move || {
        let reaper = reaper.clone();
        async move {
            let report = reaper.sweep(Utc::now()).await?;
            if !report.is_empty() {
                info!(
                    "Reaper: {} requeued, {} failed, {} skipped",
                    report.requeued.len(),
                    report.failed.len(),
                    report.skipped
                );
            }
            anyhow::Ok(())
        }
    });

    let retention = Arc::new(RetentionSweep::new(
        stores.jobs.clone(),
        config.retention_days,
    ));
    spawn_periodic("retention", config.retention_interval, move || {
        let retention = retention.clone();
        async move {
            retention.sweep(Utc::now()).await?;
            anyhow::Ok(())
        }
    });

    let poller = if config.poll_enabled {
        let poller = Arc::new(JobPoller::new(
            claims.clone(),
            orchestrator.clone(),
            config.max_parallel_jobs,
            config.poll_interval,
            config.poll_batch_size,
        ));
        let runner = poller.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        Some((poller, handle))
    } else {
        info!("Poll loop disabled, jobs run from triggers only");
        None
    };

    let state = AppState {
        stores: stores.clone(),
        storage: collaborators.storage.clone(),
        claims,
        orchestrator,
        qa: Arc::new(QaService::new(
            stores,
            collaborators.generator.clone(),
            config.qa_timeout,
            config.qa_max_questions,
        )),
    };
    let app = api::create_router(state);

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some((poller, handle)) = poller {
        handle.abort();
        info!("Waiting for running jobs to finish...");
        poller.drain().await;
    }

    info!("Tenet Worker stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;

    info!(
        "Loaded configuration: bind_addr={}, store={}, poll_enabled={}, lease={:?}, max_attempts={}",
        config.bind_addr,
        if config.database_url.is_some() {
            "postgres"
        } else {
            "memory"
        },
        config.poll_enabled,
        config.lease_duration,
        config.max_attempts
    );

    Ok(config)
}

async fn build_stores(config: &Config) -> Result<Stores> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set, using the in-memory store; state is lost on exit");
        return Ok(Stores::memory());
    };

    info!("Connecting to database...");
    let pool = connect_with_retry(database_url).await?;
    info!("Database connection pool created");

    tenet_store::db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Stores::postgres(pool))
}

/// Connects to Postgres with retry logic and exponential backoff
///
/// The database may not be ready yet when the worker starts (common in
/// container environments).
async fn connect_with_retry(database_url: &str) -> Result<PgPool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match tenet_store::db::create_pool(database_url).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!("Connected to database after {} attempt(s)", attempt);
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to database after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to connect to database: {}", e));
                }

                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}

fn build_collaborators(config: &Config) -> Result<Collaborators> {
    let storage = Arc::new(LocalStorage::new(config.storage_root.clone()));

    let primary: Option<Arc<dyn TextExtractor>> = match &config.extraction_url {
        Some(url) => {
            info!("Primary extraction service: {}", url);
            let extractor = HttpExtractor::new(url.clone(), config.extraction_timeout)
                .context("Failed to build extraction client")?;
            Some(Arc::new(extractor))
        }
        None => {
            info!("No extraction service configured, using local extraction only");
            None
        }
    };
    let extraction = Arc::new(ExtractionChain::new(primary, Arc::new(LocalExtractor::new())));

    let generator: Arc<dyn ContentGenerator> = match &config.generation.url {
        Some(url) => {
            info!(
                "Generation backend: {} (model {})",
                url, config.generation.model
            );
            Arc::new(HttpGenerator::new(url.clone(), &config.generation))
        }
        None => {
            warn!("GENERATION_URL not set, using the deterministic stub generator");
            Arc::new(StubGenerator::new())
        }
    };

    Ok(Collaborators {
        storage,
        extraction,
        generator,
    })
}
