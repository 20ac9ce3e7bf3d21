//! Extracted text types
//!
//! Output of the extraction collaborators and input of the segmenter.

use serde::{Deserialize, Serialize};

/// Confidence assigned to text recovered by the local fallback extractor
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Text of a single page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// One-based page number
    pub page_number: u32,
    pub text: String,
    pub confidence: f64,
}

/// Text of a whole document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub pages: Vec<ExtractedPage>,
    #[serde(default)]
    pub fallback_used: bool,
}

impl ExtractedText {
    pub fn new(pages: Vec<ExtractedPage>, fallback_used: bool) -> Self {
        Self {
            pages,
            fallback_used,
        }
    }

    /// All page texts joined by a blank line
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// True when no page carries any non-whitespace text
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_text_and_blankness() {
        let text = ExtractedText::new(
            vec![
                ExtractedPage {
                    page_number: 1,
                    text: "first".to_string(),
                    confidence: 0.9,
                },
                ExtractedPage {
                    page_number: 2,
                    text: "second".to_string(),
                    confidence: 0.5,
                },
            ],
            false,
        );

        assert_eq!(text.full_text(), "first\n\nsecond");
        assert!(!text.is_blank());
        assert!(ExtractedText::default().is_blank());
    }
}
