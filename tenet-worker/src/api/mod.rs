//! API Module
//!
//! HTTP surface of the worker. Handlers are thin: they parse requests, call
//! a service and map its errors. Each submodule handles endpoints for a
//! specific concern.

pub mod error;
pub mod health;
pub mod job;
pub mod qa;
pub mod trigger;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tenet_store::Stores;
use tower_http::trace::TraceLayer;

use crate::collaborators::BlobStorage;
use crate::pipeline::Orchestrator;
use crate::service::job::MAX_UPLOAD_BYTES;
use crate::service::{ClaimService, QaService};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub storage: Arc<dyn BlobStorage>,
    pub claims: ClaimService,
    pub orchestrator: Arc<Orchestrator>,
    pub qa: Arc<QaService>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Probes
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        // Job endpoints
        .route(
            "/job",
            post(job::submit_job).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/job/{id}", get(job::get_job))
        .route("/job/{id}/report", get(job::get_report))
        .route("/job/{id}/question", post(qa::ask_question))
        // Ingestion trigger
        .route("/internal/job/process", post(trigger::process_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
