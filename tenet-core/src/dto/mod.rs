//! Data Transfer Objects
//!
//! Lightweight shapes exchanged with callers of the HTTP surface and with the
//! ingestion side. Internal fields such as storage paths and error codes are
//! deliberately absent from the outward-facing views.

pub mod job;
pub mod qa;
