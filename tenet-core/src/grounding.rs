//! Grounding validator
//!
//! Enforces cite-or-abstain on generated content. Every item must cite at
//! least one segment and every cited index must belong to the job's segment
//! set; otherwise the item is rewritten to [`ABSTENTION_TEXT`] with no
//! citations. Validation is strict: one unknown index invalidates the whole
//! item. Page references are always recomputed from the cited segments and
//! never taken from the generator.

use std::collections::{BTreeSet, HashMap};

use crate::domain::qa::INSUFFICIENT_EVIDENCE;
use crate::domain::report::{
    ABSTENTION_TEXT, GroundingViolation, ReportItem, ReportSections, Severity, ViolationReason,
};
use crate::domain::segment::Segment;

/// Validated sections and the record of every rewritten item
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub sections: ReportSections,
    pub violations: Vec<GroundingViolation>,
}

/// Validator bound to one job's segment set
pub struct GroundingValidator {
    /// Segment index -> page number
    pages: HashMap<u32, u32>,
}

impl GroundingValidator {
    pub fn new(valid_segments: &[Segment]) -> Self {
        Self {
            pages: valid_segments
                .iter()
                .map(|s| (s.index, s.page_number))
                .collect(),
        }
    }

    /// Validates every item of every section
    pub fn validate(&self, candidate: ReportSections) -> ValidationOutcome {
        let mut sections = candidate;
        let mut violations = Vec::new();

        self.validate_items("summary", &mut sections.summary, &mut violations);
        self.validate_items("obligations", &mut sections.obligations, &mut violations);
        self.validate_items("restrictions", &mut sections.restrictions, &mut violations);
        self.validate_items(
            "termination_triggers",
            &mut sections.termination_triggers,
            &mut violations,
        );

        for risk in &mut sections.risks {
            self.validate_items(risk.category.key(), &mut risk.items, &mut violations);
            risk.detected = risk.items.iter().any(|item| !item.is_abstention());
        }

        ValidationOutcome {
            sections,
            violations,
        }
    }

    /// Applies the same strict check to a Q&A answer
    pub fn ground_answer(
        &self,
        answer: &str,
        citations: &[u32],
        claims_grounded: bool,
    ) -> GroundedAnswer {
        let admits_gap = answer.to_lowercase().contains("insufficient evidence");

        match self.resolve(citations) {
            Ok(_) if claims_grounded && !admits_gap && !answer.trim().is_empty() => GroundedAnswer {
                answer: answer.trim().to_string(),
                citations: normalized(citations),
                grounded: true,
            },
            _ => GroundedAnswer {
                answer: INSUFFICIENT_EVIDENCE.to_string(),
                citations: Vec::new(),
                grounded: false,
            },
        }
    }

    fn validate_items(
        &self,
        section: &str,
        items: &mut [ReportItem],
        violations: &mut Vec<GroundingViolation>,
    ) {
        for item in items.iter_mut() {
            // An explicit abstention from the generator is already compliant
            if item.text == ABSTENTION_TEXT && item.citations.is_empty() {
                abstain(item);
                continue;
            }

            match self.resolve(&item.citations) {
                Ok(page_refs) => {
                    item.citations = normalized(&item.citations);
                    item.page_refs = page_refs;
                }
                Err(reason) => {
                    violations.push(GroundingViolation {
                        section: section.to_string(),
                        item_text: item.text.clone(),
                        reason,
                    });
                    abstain(item);
                }
            }
        }
    }

    /// Sorted distinct pages of the cited segments, or why they cannot be resolved
    fn resolve(&self, citations: &[u32]) -> Result<Vec<u32>, ViolationReason> {
        if citations.is_empty() {
            return Err(ViolationReason::MissingCitations);
        }

        let unknown: BTreeSet<u32> = citations
            .iter()
            .copied()
            .filter(|index| !self.pages.contains_key(index))
            .collect();
        if !unknown.is_empty() {
            return Err(ViolationReason::UnknownSegments {
                indices: unknown.into_iter().collect(),
            });
        }

        let pages: BTreeSet<u32> = citations
            .iter()
            .filter_map(|index| self.pages.get(index).copied())
            .collect();
        Ok(pages.into_iter().collect())
    }
}

/// Q&A answer after grounding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedAnswer {
    pub answer: String,
    pub citations: Vec<u32>,
    pub grounded: bool,
}

/// Convenience wrapper for one-shot validation
pub fn validate(candidate: ReportSections, valid_segments: &[Segment]) -> ValidationOutcome {
    GroundingValidator::new(valid_segments).validate(candidate)
}

fn abstain(item: &mut ReportItem) {
    item.text = ABSTENTION_TEXT.to_string();
    item.citations.clear();
    item.page_refs.clear();
    if item.severity.is_some() {
        item.severity = Some(Severity::Low);
    }
}

fn normalized(citations: &[u32]) -> Vec<u32> {
    citations
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
