//! Q&A DTOs

use serde::{Deserialize, Serialize};

/// Question about a processed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestion {
    pub question: String,
}

/// Grounded answer with resolved citations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaAnswer {
    pub question: String,
    pub answer: String,
    pub grounded: bool,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub segment_index: u32,
    pub page_number: u32,
    /// Leading excerpt of the cited segment
    pub excerpt: String,
}
