//! Grounded Q&A
//!
//! Answers questions about a completed job from its segments only. Answers
//! go through the same strict citation check as report items and fall back
//! to an explicit insufficient-evidence reply.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tenet_core::domain::job::JobStatus;
use tenet_core::domain::qa::{QaConfidence, QaInteraction};
use tenet_core::domain::segment::Segment;
use tenet_core::dto::qa::{Citation, QaAnswer};
use tenet_core::grounding::GroundingValidator;
use tenet_store::{StoreError, Stores};
use thiserror::Error;
use uuid::Uuid;

use crate::collaborators::{ContentGenerator, GenerationError};
use crate::pipeline::{prompts, response};

pub const MAX_QUESTION_CHARS: usize = 500;
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job is {0}; questions are accepted once analysis succeeds")]
    NotReady(JobStatus),

    #[error("{0}")]
    Validation(String),

    #[error("question limit of {0} reached for this document")]
    LimitReached(usize),

    #[error("answer generation timed out")]
    Timeout,

    #[error(transparent)]
    Generation(GenerationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct QaService {
    stores: Stores,
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
    max_questions: usize,
}

impl QaService {
    pub fn new(
        stores: Stores,
        generator: Arc<dyn ContentGenerator>,
        timeout: Duration,
        max_questions: usize,
    ) -> Self {
        Self {
            stores,
            generator,
            timeout,
            max_questions,
        }
    }

    pub async fn ask(&self, job_id: Uuid, question: &str) -> Result<QaAnswer, QaError> {
        let question = validate_question(question)?;

        let job = self
            .stores
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or(QaError::NotFound(job_id))?;
        if job.status != JobStatus::Success {
            return Err(QaError::NotReady(job.status));
        }

        if self.stores.qa.count_for_job(job_id).await? >= self.max_questions {
            return Err(QaError::LimitReached(self.max_questions));
        }

        let segments = self.stores.segments.find_by_job(job_id).await?;
        let raw = self.generate(&prompts::answer(question, &segments)).await?;

        let candidate = response::parse_answer(&raw).unwrap_or_else(|e| {
            tracing::warn!("Job {}: unparseable answer response: {}", job_id, e);
            response::CandidateAnswer {
                answer: String::new(),
                citations: Vec::new(),
                claims_grounded: false,
            }
        });
        let grounded = GroundingValidator::new(&segments).ground_answer(
            &candidate.answer,
            &candidate.citations,
            candidate.claims_grounded,
        );

        let interaction = QaInteraction {
            id: Uuid::new_v4(),
            job_id,
            question: question.to_string(),
            answer: grounded.answer.clone(),
            citations: grounded.citations.clone(),
            confidence: if grounded.grounded {
                QaConfidence::Confident
            } else {
                QaConfidence::Abstained
            },
            created_at: Utc::now(),
        };
        self.stores
            .qa
            .record(&interaction, self.max_questions)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => QaError::LimitReached(self.max_questions),
                other => QaError::Store(other),
            })?;

        tracing::info!(
            "Job {}: answered question ({})",
            job_id,
            interaction.confidence.as_str()
        );

        Ok(QaAnswer {
            question: interaction.question,
            answer: grounded.answer,
            grounded: grounded.grounded,
            citations: resolve_citations(&grounded.citations, &segments),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, QaError> {
        match tokio::time::timeout(self.timeout, self.generator.generate(prompt, self.timeout)).await
        {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(GenerationError::Timeout(_))) | Err(_) => Err(QaError::Timeout),
            Ok(Err(e)) => Err(QaError::Generation(e)),
        }
    }
}

fn validate_question(question: &str) -> Result<&str, QaError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(QaError::Validation("question cannot be empty".to_string()));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(QaError::Validation(format!(
            "question cannot exceed {} characters",
            MAX_QUESTION_CHARS
        )));
    }
    Ok(question)
}

fn resolve_citations(indices: &[u32], segments: &[Segment]) -> Vec<Citation> {
    indices
        .iter()
        .filter_map(|index| segments.iter().find(|s| s.index == *index))
        .map(|s| Citation {
            segment_index: s.index,
            page_number: s.page_number,
            excerpt: s.text.chars().take(EXCERPT_CHARS).collect(),
        })
        .collect()
}
