//! Text extraction collaborator
//!
//! Turns uploaded bytes into per-page text. A remote extraction service is
//! tried first when configured; the local extractor is the fallback and is
//! also used on its own when no service is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tenet_core::domain::extraction::{ExtractedPage, ExtractedText, FALLBACK_CONFIDENCE};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extractor could not be reached or answered with a server error
    #[error("extraction service unavailable: {0}")]
    Unavailable(String),

    /// The document itself cannot be read
    #[error("document unreadable: {0}")]
    Unreadable(String),

    #[error("invalid extraction response: {0}")]
    InvalidResponse(String),
}

impl ExtractionError {
    /// True when a later attempt could succeed on the same input
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Trait implemented by every extraction backend
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Extracts the text of every page
    ///
    /// # Arguments
    /// * `bytes` - Raw document content
    /// * `filename` - Original filename, used as a format hint
    async fn extract(&self, bytes: &[u8], filename: &str) -> Result<ExtractedText, ExtractionError>;
}

/// Remote extraction service speaking JSON over HTTP
///
/// Posts the raw document and expects an `ExtractedText` body back.
pub struct HttpExtractor {
    client: Client,
    base_url: String,
}

impl HttpExtractor {
    /// Creates a new HTTP extractor
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the service (e.g., "http://localhost:9000")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TextExtractor for HttpExtractor {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn extract(&self, bytes: &[u8], filename: &str) -> Result<ExtractedText, ExtractionError> {
        let url = format!("{}/extract", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Unavailable(format!("{} - {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Unreadable(format!("{} - {}", status, body)));
        }

        let mut text = response
            .json::<ExtractedText>()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        for page in &mut text.pages {
            page.confidence = page.confidence.clamp(0.0, 1.0);
        }
        text.fallback_used = false;

        Ok(text)
    }
}

/// In-process extraction of PDFs and plain text
///
/// PDFs are read page by page with `lopdf`; anything else is decoded as
/// UTF-8 text with form feeds separating pages. Every page gets the fixed
/// fallback confidence.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalExtractor;

impl LocalExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for LocalExtractor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn extract(&self, bytes: &[u8], filename: &str) -> Result<ExtractedText, ExtractionError> {
        let pages = if bytes.starts_with(b"%PDF") {
            let owned = bytes.to_vec();
            let name = filename.to_string();
            tokio::task::spawn_blocking(move || pdf_pages(&owned, &name))
                .await
                .map_err(|e| ExtractionError::Unreadable(format!("pdf task failed: {}", e)))??
        } else {
            text_pages(bytes)?
        };

        Ok(ExtractedText::new(pages, true))
    }
}

fn pdf_pages(bytes: &[u8], filename: &str) -> Result<Vec<ExtractedPage>, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExtractionError::Unreadable(format!("failed to load PDF: {}", e)))?;

    let pages = doc
        .get_pages()
        .into_keys()
        .map(|page_number| {
            let text = doc.extract_text(&[page_number]).unwrap_or_else(|e| {
                tracing::warn!(
                    "Failed to extract page {} of {}: {}",
                    page_number,
                    filename,
                    e
                );
                String::new()
            });
            ExtractedPage {
                page_number,
                text,
                confidence: FALLBACK_CONFIDENCE,
            }
        })
        .collect();

    Ok(pages)
}

fn text_pages(bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractionError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractionError::Unreadable(format!("not a PDF or UTF-8 text: {}", e)))?;

    Ok(text
        .split('\x0c')
        .zip(1u32..)
        .map(|(page, page_number)| ExtractedPage {
            page_number,
            text: page.replace("\r\n", "\n"),
            confidence: FALLBACK_CONFIDENCE,
        })
        .collect())
}

/// Primary extractor with a local fallback
pub struct ExtractionChain {
    primary: Option<Arc<dyn TextExtractor>>,
    fallback: Arc<dyn TextExtractor>,
}

impl ExtractionChain {
    pub fn new(primary: Option<Arc<dyn TextExtractor>>, fallback: Arc<dyn TextExtractor>) -> Self {
        Self { primary, fallback }
    }

    /// Chain with only the local extractor
    pub fn local() -> Self {
        Self::new(None, Arc::new(LocalExtractor::new()))
    }

    /// Runs the primary extractor, falling back on error or blank output
    ///
    /// The fallback's result is returned as-is, blank or not; the caller
    /// decides what an empty document means.
    pub async fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractedText, ExtractionError> {
        if let Some(primary) = &self.primary {
            match primary.extract(bytes, filename).await {
                Ok(text) if !text.is_blank() => return Ok(text),
                Ok(_) => tracing::warn!(
                    "Extractor '{}' returned no text for {}, using '{}'",
                    primary.name(),
                    filename,
                    self.fallback.name()
                ),
                Err(e) => tracing::warn!(
                    "Extractor '{}' failed for {}: {}, using '{}'",
                    primary.name(),
                    filename,
                    e,
                    self.fallback.name()
                ),
            }
        }

        let mut text = self.fallback.extract(bytes, filename).await?;
        text.fallback_used = true;
        Ok(text)
    }
}
