//! Prompt builders
//!
//! Every prompt opens with a task marker line so backends and tests can tell
//! the stages apart, followed by the instructions, the segment context and
//! the expected JSON shape.

use tenet_core::domain::report::RiskCategory;
use tenet_core::domain::segment::Segment;

pub const MAX_SUMMARY_BULLETS: usize = 10;

/// Characters of document text shown to the generator for classification
const CLASSIFICATION_SAMPLE_CHARS: usize = 3000;

/// Generation task carried by a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Classify,
    Risk,
    Summary,
    Obligations,
    Answer,
}

impl Task {
    const ALL: [Task; 5] = [
        Task::Classify,
        Task::Risk,
        Task::Summary,
        Task::Obligations,
        Task::Answer,
    ];

    pub fn marker(&self) -> &'static str {
        match self {
            Task::Classify => "TASK: DOCUMENT_CLASSIFICATION",
            Task::Risk => "TASK: RISK_ANALYSIS",
            Task::Summary => "TASK: SUMMARY",
            Task::Obligations => "TASK: OBLIGATIONS",
            Task::Answer => "TASK: QUESTION_ANSWERING",
        }
    }

    /// Finds the task from the prompt's first line
    pub fn detect(prompt: &str) -> Option<Task> {
        let first = prompt.lines().next()?.trim();
        Task::ALL.into_iter().find(|task| task.marker() == first)
    }
}

/// Renders segments as the cited context block
pub fn segment_context(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| {
            format!(
                "[Chunk ID: {}, Page: {}]\n{}\n\n",
                s.index, s.page_number, s.text
            )
        })
        .collect()
}

pub fn classification(document_text: &str) -> String {
    let sample: String = document_text
        .chars()
        .take(CLASSIFICATION_SAMPLE_CHARS)
        .collect();

    format!(
        "{}\n\
         Classify this legal document as one of: TOS, PRIVACY_POLICY, LEASE, UNKNOWN.\n\n\
         Document text:\n{}\n\n\
         Return a JSON response with this structure:\n\
         {{\"document_type\": \"TOS\" | \"PRIVACY_POLICY\" | \"LEASE\" | \"UNKNOWN\", \"confidence\": 0.0-1.0}}\n",
        Task::Classify.marker(),
        sample
    )
}

pub fn risk(category: RiskCategory, segments: &[Segment]) -> String {
    format!(
        "{}\n\
         CATEGORY: {}\n\
         You are analyzing a legal document for risks. Scan all provided document excerpts and identify \
         {} risks: {}.\n\n\
         Document excerpts:\n{}\
         Return a JSON response with this structure:\n\
         {{\"detected\": true/false, \"items\": [{{\"text\": \"description of the risk\", \
         \"severity\": \"low\" | \"medium\" | \"high\", \"chunk_ids\": [chunk IDs supporting this risk]}}]}}\n\n\
         If no risks are found in this category, return: {{\"detected\": false, \"items\": []}}\n\
         Every risk item MUST cite at least one chunk_id. Do not include risks without citations.",
        Task::Risk.marker(),
        category.key(),
        category.title(),
        category.description(),
        segment_context(segments)
    )
}

pub fn summary(segments: &[Segment]) -> String {
    format!(
        "{}\n\
         Summarize the key findings from this legal document in plain English.\n\n\
         Document excerpts:\n{}\
         Return a JSON response with this structure:\n\
         {{\"bullets\": [{{\"text\": \"plain English summary bullet point\", \
         \"chunk_ids\": [chunk IDs that support this bullet]}}]}}\n\n\
         Generate at most {} bullets. Each bullet MUST cite at least one chunk_id. \
         Use clear, non-technical language.",
        Task::Summary.marker(),
        segment_context(segments),
        MAX_SUMMARY_BULLETS
    )
}

pub fn obligations(segments: &[Segment]) -> String {
    format!(
        "{}\n\
         Extract obligations, restrictions, and termination triggers from this legal document.\n\n\
         Document excerpts:\n{}\
         Return a JSON response with this structure:\n\
         {{\"obligations\": [{{\"text\": \"description\", \"severity\": \"low/medium/high\", \"chunk_ids\": [...]}}], \
         \"restrictions\": [...], \"termination_triggers\": [...]}}\n\n\
         Each item MUST cite at least one chunk_id. If a category has no items, use an empty array.",
        Task::Obligations.marker(),
        segment_context(segments)
    )
}

pub fn answer(question: &str, segments: &[Segment]) -> String {
    format!(
        "{}\n\
         Answer the question using only the document excerpts below.\n\n\
         Question: {}\n\n\
         Document excerpts:\n{}\
         Return a JSON response with this structure:\n\
         {{\"answer\": \"answer text\", \"chunk_ids\": [chunk IDs supporting the answer], \"is_grounded\": true/false}}\n\n\
         If the excerpts do not answer the question, reply with \"Insufficient evidence\", \
         an empty chunk_ids list and is_grounded false.",
        Task::Answer.marker(),
        question.trim(),
        segment_context(segments)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: u32, page: u32, text: &str) -> Segment {
        Segment {
            index,
            text: text.to_string(),
            page_number: page,
            start_offset: 0,
            end_offset: text.chars().count() as u32,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_segment_context_format() {
        let context = segment_context(&[segment(0, 1, "Rent is due."), segment(1, 3, "No pets.")]);
        assert_eq!(
            context,
            "[Chunk ID: 0, Page: 1]\nRent is due.\n\n[Chunk ID: 1, Page: 3]\nNo pets.\n\n"
        );
    }

    #[test]
    fn test_task_detection() {
        let segments = [segment(0, 1, "text")];

        assert_eq!(Task::detect(&classification("text")), Some(Task::Classify));
        assert_eq!(
            Task::detect(&risk(RiskCategory::Financial, &segments)),
            Some(Task::Risk)
        );
        assert_eq!(Task::detect(&summary(&segments)), Some(Task::Summary));
        assert_eq!(Task::detect(&obligations(&segments)), Some(Task::Obligations));
        assert_eq!(Task::detect(&answer("Is rent due?", &segments)), Some(Task::Answer));
        assert_eq!(Task::detect("hello"), None);
    }

    #[test]
    fn test_risk_prompt_names_category() {
        let prompt = risk(RiskCategory::LegalRightsWaivers, &[]);
        assert!(prompt.contains("CATEGORY: legal_rights_waivers"));
        assert!(prompt.contains("arbitration clauses"));
    }
}
