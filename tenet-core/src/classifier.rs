//! Document classifier
//!
//! Rules-based detection of the document type from the opening text. The
//! worker falls back to the content generator when the rules are not
//! confident enough.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Only the opening of the document is inspected
const SAMPLE_CHARS: usize = 2000;
const MIN_MATCHES: usize = 2;
const MAX_RULE_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Tos,
    PrivacyPolicy,
    Lease,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Tos => "TOS",
            DocumentType::PrivacyPolicy => "PRIVACY_POLICY",
            DocumentType::Lease => "LEASE",
            DocumentType::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse used for generated labels
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "TOS" | "TERMS_OF_SERVICE" => DocumentType::Tos,
            "PRIVACY_POLICY" | "PRIVACY" => DocumentType::PrivacyPolicy,
            "LEASE" | "LEASE_AGREEMENT" => DocumentType::Lease,
            _ => DocumentType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Rules,
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub document_type: DocumentType,
    pub confidence: f64,
    pub method: ClassificationMethod,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            document_type: DocumentType::Unknown,
            confidence: 0.0,
            method: ClassificationMethod::Rules,
        }
    }
}

pub struct RuleClassifier {
    rules: Vec<(DocumentType, Regex)>,
}

impl RuleClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            (
                DocumentType::Tos,
                Regex::new(
                    r"(?i)(terms\s+of\s+service|terms\s+and\s+conditions|agree\s+to|bound\s+by|acceptance)",
                )?,
            ),
            (
                DocumentType::PrivacyPolicy,
                Regex::new(
                    r"(?i)(privacy\s+policy|data\s+collect|personal\s+information|process\s+data|cookie)",
                )?,
            ),
            (
                DocumentType::Lease,
                Regex::new(
                    r"(?i)(lease\s+agreement|rent|tenant|landlord|property|monthly\s+rent|security\s+deposit)",
                )?,
            ),
        ];
        Ok(Self { rules })
    }

    /// Classifies by counting pattern hits in the opening text
    ///
    /// The winner needs strictly more hits than every other type and at
    /// least two of them; confidence grows with the hit count.
    pub fn classify(&self, text: &str) -> Classification {
        let sample: String = text.chars().take(SAMPLE_CHARS).collect();

        let counts: Vec<(DocumentType, usize)> = self
            .rules
            .iter()
            .map(|(doc_type, pattern)| (*doc_type, pattern.find_iter(&sample).count()))
            .collect();

        let Some(&(best, hits)) = counts.iter().max_by_key(|(_, n)| *n) else {
            return Classification::unknown();
        };
        let tied = counts.iter().filter(|(_, n)| *n == hits).count() > 1;

        if hits < MIN_MATCHES || tied {
            return Classification::unknown();
        }

        Classification {
            document_type: best,
            confidence: (0.70 + 0.05 * hits as f64).min(MAX_RULE_CONFIDENCE),
            method: ClassificationMethod::Rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_detected() {
        let classifier = RuleClassifier::new().unwrap();
        let result = classifier.classify(
            "RESIDENTIAL LEASE AGREEMENT. The Tenant shall pay monthly rent to the Landlord.",
        );

        assert_eq!(result.document_type, DocumentType::Lease);
        assert_eq!(result.method, ClassificationMethod::Rules);
        assert!(result.confidence > 0.70 && result.confidence <= 0.95);
    }

    #[test]
    fn test_confidence_is_capped() {
        let classifier = RuleClassifier::new().unwrap();
        let text = "cookie privacy policy personal information ".repeat(20);
        let result = classifier.classify(&text);

        assert_eq!(result.document_type, DocumentType::PrivacyPolicy);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_single_match_is_unknown() {
        let classifier = RuleClassifier::new().unwrap();
        let result = classifier.classify("By continuing you agree to nothing in particular.");
        assert_eq!(result, Classification::unknown());
    }

    #[test]
    fn test_tie_is_unknown() {
        let classifier = RuleClassifier::new().unwrap();
        let result = classifier.classify("Terms of service. Privacy policy. Bound by cookie rules.");
        assert_eq!(result.document_type, DocumentType::Unknown);
    }

    #[test]
    fn test_only_opening_text_counts() {
        let classifier = RuleClassifier::new().unwrap();
        let text = format!("{}{}", "x".repeat(2000), "tenant landlord rent ".repeat(10));
        assert_eq!(
            classifier.classify(&text).document_type,
            DocumentType::Unknown
        );
    }

    #[test]
    fn test_parse_generated_labels() {
        assert_eq!(DocumentType::parse("terms of service"), DocumentType::Tos);
        assert_eq!(DocumentType::parse("PRIVACY_POLICY"), DocumentType::PrivacyPolicy);
        assert_eq!(DocumentType::parse("lease"), DocumentType::Lease);
        assert_eq!(DocumentType::parse("invoice"), DocumentType::Unknown);
    }
}
