//! Q&A domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Answer returned when a question cannot be grounded in the document
pub const INSUFFICIENT_EVIDENCE: &str =
    "Insufficient evidence: This document does not address your question.";

/// A recorded question and its grounded answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaInteraction {
    pub id: Uuid,
    pub job_id: Uuid,
    pub question: String,
    pub answer: String,
    pub citations: Vec<u32>,
    pub confidence: QaConfidence,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QaConfidence {
    Confident,
    Abstained,
}

impl QaConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            QaConfidence::Confident => "CONFIDENT",
            QaConfidence::Abstained => "ABSTAINED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "CONFIDENT" => QaConfidence::Confident,
            _ => QaConfidence::Abstained,
        }
    }
}
