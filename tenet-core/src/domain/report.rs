//! Report domain types
//!
//! A report is written once per job, after every item has passed through the
//! grounding validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claim text that replaces any item which cannot be grounded
pub const ABSTENTION_TEXT: &str = "Not detected / Not stated";

/// Validated analysis report for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub job_id: Uuid,
    pub overview: Overview,
    pub sections: ReportSections,
    /// Items rewritten to the abstention text during validation
    pub violations: Vec<GroundingViolation>,
    pub created_at: DateTime<Utc>,
}

/// Document overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub document_type: String,
    pub classification_confidence: f64,
    pub filename: String,
    pub file_size_bytes: i64,
    pub total_segments: usize,
    pub extraction_fallback_used: bool,
}

/// The list sections of a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSections {
    pub summary: Vec<ReportItem>,
    pub obligations: Vec<ReportItem>,
    pub restrictions: Vec<ReportItem>,
    pub termination_triggers: Vec<ReportItem>,
    pub risks: Vec<RiskAssessment>,
}

impl ReportSections {
    /// Total number of list items across all sections
    pub fn item_count(&self) -> usize {
        self.summary.len()
            + self.obligations.len()
            + self.restrictions.len()
            + self.termination_triggers.len()
            + self.risks.iter().map(|r| r.items.len()).sum::<usize>()
    }

    /// Every item together with the name of its section
    pub fn items(&self) -> impl Iterator<Item = (&'static str, &ReportItem)> {
        let fixed = [
            ("summary", &self.summary),
            ("obligations", &self.obligations),
            ("restrictions", &self.restrictions),
            ("termination_triggers", &self.termination_triggers),
        ]
        .into_iter()
        .flat_map(|(name, items)| items.iter().map(move |i| (name, i)));

        let risks = self
            .risks
            .iter()
            .flat_map(|r| r.items.iter().map(move |i| (r.category.key(), i)));

        fixed.chain(risks)
    }
}

/// A single claim with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportItem {
    pub text: String,
    /// Segment indices the claim is grounded on
    #[serde(default)]
    pub citations: Vec<u32>,
    /// Page numbers derived from the cited segments
    #[serde(default)]
    pub page_refs: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl ReportItem {
    pub fn new(text: impl Into<String>, citations: Vec<u32>) -> Self {
        Self {
            text: text.into(),
            citations,
            page_refs: Vec::new(),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn is_abstention(&self) -> bool {
        self.text == ABSTENTION_TEXT && self.citations.is_empty()
    }
}

/// Risk severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Parses a generated severity, defaulting unknown values to medium
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            _ => Severity::Medium,
        }
    }
}

/// Fixed risk taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCategory {
    DataPrivacy,
    Financial,
    LegalRightsWaivers,
    Termination,
    Modification,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 5] = [
        RiskCategory::DataPrivacy,
        RiskCategory::Financial,
        RiskCategory::LegalRightsWaivers,
        RiskCategory::Termination,
        RiskCategory::Modification,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            RiskCategory::DataPrivacy => "data_privacy",
            RiskCategory::Financial => "financial",
            RiskCategory::LegalRightsWaivers => "legal_rights_waivers",
            RiskCategory::Termination => "termination",
            RiskCategory::Modification => "modification",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            RiskCategory::DataPrivacy => "Data/Privacy",
            RiskCategory::Financial => "Financial",
            RiskCategory::LegalRightsWaivers => "Legal Rights Waivers",
            RiskCategory::Termination => "Termination",
            RiskCategory::Modification => "Modification",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskCategory::DataPrivacy => "data collection, sharing, retention policies",
            RiskCategory::Financial => "fees, penalties, payment obligations",
            RiskCategory::LegalRightsWaivers => "arbitration clauses, class action waivers",
            RiskCategory::Termination => "cancellation fees, auto-renewal clauses",
            RiskCategory::Modification => "unilateral changes, notice requirements",
        }
    }
}

/// Findings for one risk category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub category: RiskCategory,
    pub detected: bool,
    pub items: Vec<ReportItem>,
}

impl RiskAssessment {
    pub fn not_detected(category: RiskCategory) -> Self {
        Self {
            category,
            detected: false,
            items: Vec::new(),
        }
    }
}

/// Record of an item the validator rewrote to the abstention text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingViolation {
    pub section: String,
    /// Claim text as generated, before rewriting
    pub item_text: String,
    pub reason: ViolationReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationReason {
    MissingCitations,
    UnknownSegments { indices: Vec<u32> },
}

impl std::fmt::Display for GroundingViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            ViolationReason::MissingCitations => write!(
                f,
                "{} item missing valid citations: {}",
                self.section, self.item_text
            ),
            ViolationReason::UnknownSegments { indices } => write!(
                f,
                "{} item cites unknown segments {:?}: {}",
                self.section, indices, self.item_text
            ),
        }
    }
}
