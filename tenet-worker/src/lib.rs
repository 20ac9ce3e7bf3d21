//! Tenet Worker
//!
//! Document analysis worker: claims jobs, runs the extraction, segmentation
//! and analysis pipeline, enforces cite-or-abstain on everything it reports,
//! and reclaims jobs whose lease lapsed.
//!
//! Architecture:
//! - Configuration: environment variables with defaults
//! - Collaborators: storage, extraction and generation backends behind traits
//! - Pipeline: the orchestrator and its prompt/response handling
//! - Services: claim, reaper, retention, Q&A and job intake
//! - Scheduler: the poll loop and periodic sweeps
//! - API: thin HTTP surface over the services

pub mod api;
pub mod collaborators;
pub mod config;
pub mod pipeline;
pub mod scheduler;
pub mod service;
