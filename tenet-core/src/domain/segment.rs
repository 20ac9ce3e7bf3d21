//! Segment domain types

use serde::{Deserialize, Serialize};

/// A bounded span of extracted text, the unit of citation
///
/// `index` is zero-based and unique within a job. Offsets are character
/// offsets into the source page text, `[start_offset, end_offset)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u32,
    pub text: String,
    pub page_number: u32,
    pub start_offset: u32,
    pub end_offset: u32,
    pub confidence: f64,
}
