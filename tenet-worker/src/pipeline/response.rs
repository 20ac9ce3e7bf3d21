//! Generator response parsing
//!
//! Generated output is untrusted. Parsers accept the documented JSON shapes,
//! tolerate Markdown code fences, and read citation ids leniently. An item
//! whose ids cannot all be read keeps no citations at all so the validator
//! rewrites it to an abstention instead of trusting a partial list.

use serde_json::Value;
use tenet_core::classifier::{Classification, ClassificationMethod, DocumentType};
use tenet_core::domain::report::{ReportItem, RiskAssessment, RiskCategory, Severity};
use thiserror::Error;

use super::prompts::MAX_SUMMARY_BULLETS;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is missing '{0}'")]
    MissingField(&'static str),
}

/// Obligations prompt output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObligationSections {
    pub obligations: Vec<ReportItem>,
    pub restrictions: Vec<ReportItem>,
    pub termination_triggers: Vec<ReportItem>,
}

/// Q&A prompt output, before grounding
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAnswer {
    pub answer: String,
    pub citations: Vec<u32>,
    pub claims_grounded: bool,
}

/// Removes a surrounding ```/```json fence if present
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn parse_json(raw: &str) -> Result<Value, ResponseError> {
    Ok(serde_json::from_str(strip_fences(raw))?)
}

pub fn parse_summary(raw: &str) -> Result<Vec<ReportItem>, ResponseError> {
    let value = parse_json(raw)?;
    let bullets = value
        .get("bullets")
        .ok_or(ResponseError::MissingField("bullets"))?;

    let mut items = parse_items(bullets, false);
    if items.len() > MAX_SUMMARY_BULLETS {
        tracing::warn!(
            "Summary contains {} bullets, truncating to {}",
            items.len(),
            MAX_SUMMARY_BULLETS
        );
        items.truncate(MAX_SUMMARY_BULLETS);
    }
    Ok(items)
}

pub fn parse_obligations(raw: &str) -> Result<ObligationSections, ResponseError> {
    let value = parse_json(raw)?;
    if !value.is_object() {
        return Err(ResponseError::MissingField("obligations"));
    }

    let section = |key: &str| {
        value
            .get(key)
            .map(|items| parse_items(items, true))
            .unwrap_or_default()
    };

    Ok(ObligationSections {
        obligations: section("obligations"),
        restrictions: section("restrictions"),
        termination_triggers: section("termination_triggers"),
    })
}

/// Reads one risk category
///
/// A response that says `detected: false` yields no items even if it lists some.
pub fn parse_risk(raw: &str, category: RiskCategory) -> Result<RiskAssessment, ResponseError> {
    let value = parse_json(raw)?;
    let detected = value
        .get("detected")
        .and_then(Value::as_bool)
        .ok_or(ResponseError::MissingField("detected"))?;

    if !detected {
        return Ok(RiskAssessment::not_detected(category));
    }

    let items = value
        .get("items")
        .map(|items| {
            parse_items(items, true)
                .into_iter()
                .map(|item| {
                    let severity = item.severity.unwrap_or(Severity::Medium);
                    item.with_severity(severity)
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(RiskAssessment {
        category,
        detected,
        items,
    })
}

pub fn parse_classification(raw: &str) -> Result<Classification, ResponseError> {
    let value = parse_json(raw)?;
    let label = value
        .get("document_type")
        .and_then(Value::as_str)
        .ok_or(ResponseError::MissingField("document_type"))?;
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    Ok(Classification {
        document_type: DocumentType::parse(label),
        confidence,
        method: ClassificationMethod::Generated,
    })
}

pub fn parse_answer(raw: &str) -> Result<CandidateAnswer, ResponseError> {
    let value = parse_json(raw)?;
    let answer = value
        .get("answer")
        .and_then(Value::as_str)
        .ok_or(ResponseError::MissingField("answer"))?;

    Ok(CandidateAnswer {
        answer: answer.to_string(),
        citations: value.get("chunk_ids").map(chunk_ids).unwrap_or_default(),
        claims_grounded: value
            .get("is_grounded")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_items(value: &Value, with_severity: bool) -> Vec<ReportItem> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let text = entry.get("text")?.as_str()?.trim();
            if text.is_empty() {
                return None;
            }

            let citations = entry.get("chunk_ids").map(chunk_ids).unwrap_or_default();
            let mut item = ReportItem::new(text, citations);
            if with_severity {
                if let Some(severity) = entry.get("severity").and_then(Value::as_str) {
                    item = item.with_severity(Severity::parse_lenient(severity));
                }
            }
            Some(item)
        })
        .collect()
}

/// All ids as segment indices, or none if any id is unreadable
fn chunk_ids(value: &Value) -> Vec<u32> {
    let Some(ids) = value.as_array() else {
        return Vec::new();
    };

    let parsed: Option<Vec<u32>> = ids
        .iter()
        .map(|id| match id {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect();

    parsed.unwrap_or_default()
}
