//! Text detection for scanned documents and images.
//!
//! Detectors return typed blocks; only `LINE` blocks carry the reading-order text pipelines
//! consume. [`lines_to_text`] joins them with a trailing newline per line.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Block type holding one line of detected text.
pub const LINE_BLOCK: &str = "LINE";

/// Errors raised by text detectors.
#[derive(Debug, Error)]
pub enum OcrError {
    /// No detector is configured for this process.
    #[error("OCR service not configured")]
    NotConfigured,
    /// Detector could not be reached.
    #[error("OCR service unavailable: {0}")]
    Unavailable(String),
    /// Detector rejected the request.
    #[error("OCR request failed: {0}")]
    RequestFailed(String),
    /// Detector response could not be decoded.
    #[error("Malformed OCR response: {0}")]
    InvalidResponse(String),
}

/// One block of detected text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Block granularity (`PAGE`, `LINE`, `WORD`, ...).
    pub block_type: String,
    /// Detected text; absent for structural blocks.
    #[serde(default)]
    pub text: Option<String>,
}

impl TextBlock {
    /// Convenience constructor for a `LINE` block.
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            block_type: LINE_BLOCK.to_string(),
            text: Some(text.into()),
        }
    }
}

/// Detects text in a stored document.
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Run detection against the object at `bucket`/`key`.
    async fn detect_text(&self, bucket: &str, key: &str) -> Result<Vec<TextBlock>, OcrError>;
}

/// Keep `LINE` blocks in order, each followed by a newline.
pub fn lines_to_text(blocks: &[TextBlock]) -> String {
    blocks
        .iter()
        .filter(|block| block.block_type == LINE_BLOCK)
        .filter_map(|block| block.text.as_deref())
        .fold(String::new(), |mut text, line| {
            text.push_str(line);
            text.push('\n');
            text
        })
}

/// Detector backed by an HTTP OCR service exposing `POST /detect`.
#[derive(Debug, Clone)]
pub struct HttpTextDetector {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    bucket: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    blocks: Vec<TextBlock>,
}

impl HttpTextDetector {
    /// Create a detector for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, OcrError> {
        let http = Client::builder()
            .user_agent("docflow/ocr")
            .build()
            .map_err(|error| {
                OcrError::Unavailable(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/detect", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextDetector for HttpTextDetector {
    async fn detect_text(&self, bucket: &str, key: &str) -> Result<Vec<TextBlock>, OcrError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&DetectRequest { bucket, key })
            .send()
            .await
            .map_err(|error| {
                OcrError::Unavailable(format!(
                    "failed to reach OCR service at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::RequestFailed(format!(
                "OCR service returned {status}: {body}"
            )));
        }

        let body: DetectResponse = response.json().await.map_err(|error| {
            OcrError::InvalidResponse(format!("failed to decode OCR response: {error}"))
        })?;
        tracing::debug!(bucket, key, blocks = body.blocks.len(), "Detected text blocks");
        Ok(body.blocks)
    }
}

/// Detector used when no OCR service is configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTextDetector;

#[async_trait]
impl TextDetector for DisabledTextDetector {
    async fn detect_text(&self, bucket: &str, key: &str) -> Result<Vec<TextBlock>, OcrError> {
        tracing::warn!(bucket, key, "OCR requested but OCR_URL is not set");
        Err(OcrError::NotConfigured)
    }
}
