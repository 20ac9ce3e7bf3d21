//! Core domain types
//!
//! This module contains the core domain structures used across Tenet crates.
//! These types are shared between the store (for persistence) and the worker
//! (for processing and serving).

pub mod extraction;
pub mod job;
pub mod qa;
pub mod report;
pub mod segment;
