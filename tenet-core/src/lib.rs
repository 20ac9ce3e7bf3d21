//! Tenet Core
//!
//! Core types and algorithms for the Tenet document analysis system.
//!
//! This crate contains:
//! - Domain types: Jobs, segments, reports and Q&A interactions
//! - DTOs: Data transfer objects exchanged with callers and collaborators
//! - Segmenter: Splits extracted page text into citable segments
//! - Grounding: Enforces cite-or-abstain on generated report items
//! - Classifier: Rules-based document type detection

pub mod classifier;
pub mod domain;
pub mod dto;
pub mod grounding;
pub mod segmenter;
