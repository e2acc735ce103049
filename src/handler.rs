//! Upload-event handling: read, extract, transform, write.
//!
//! One [`DocumentHandler::handle`] call is one invocation. Every failure is logged and turned
//! into a 500 [`InvocationResult`]; nothing is written unless the pipeline produced a
//! complete result.

use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::ocr::{OcrError, TextDetector, lines_to_text};
use crate::processing::{
    DocumentPipeline, PipelineError, PipelineKind, PipelineOutput, PipelineStage,
};
use crate::storage::{ObjectStore, StorageError, TEXT_PLAIN};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::string::FromUtf8Error;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Content types routed through the text detector instead of being decoded as UTF-8.
pub const OCR_CONTENT_TYPES: [&str; 3] = ["application/pdf", "image/jpeg", "image/png"];

const INPUT_PREFIX: &str = "documents/";

/// Object-store notification announcing an upload. Only the first record is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    /// Notification records, in delivery order.
    #[serde(rename = "Records", default)]
    pub records: Vec<UploadRecord>,
}

/// One notification record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Location of the uploaded object.
    pub s3: ObjectLocation,
}

/// Bucket and object of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocation {
    /// Bucket holding the object.
    pub bucket: BucketRef,
    /// Uploaded object.
    pub object: ObjectRef,
}

/// Bucket reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRef {
    /// Bucket name.
    pub name: String,
}

/// Object reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Object key, for example `documents/report.pdf`.
    pub key: String,
}

impl UploadEvent {
    /// Event with a single record for `bucket`/`key`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            records: vec![UploadRecord {
                s3: ObjectLocation {
                    bucket: BucketRef { name: bucket.into() },
                    object: ObjectRef { key: key.into() },
                },
            }],
        }
    }

    /// Bucket and key of the first record.
    pub fn location(&self) -> Option<(&str, &str)> {
        self.records
            .first()
            .map(|record| (record.s3.bucket.name.as_str(), record.s3.object.key.as_str()))
    }
}

/// Status code and message returned to the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// 200 on success, 500 on any failure.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Human-readable outcome.
    pub body: String,
}

impl InvocationResult {
    /// Successful invocation.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: message.into(),
        }
    }

    /// Failed invocation.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status_code: 500,
            body: message.into(),
        }
    }

    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Failures while turning a stored object into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Source object could not be read.
    #[error("failed to read source object: {0}")]
    Read(#[source] StorageError),
    /// Text detection failed.
    #[error("text detection failed: {0}")]
    Ocr(#[from] OcrError),
    /// Plain-text object was not valid UTF-8.
    #[error("document is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),
}

/// Any failure of one invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Event carried no record.
    #[error("upload event has no records")]
    InvalidEvent,
    /// Text extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Result could not be written.
    #[error("failed to write result: {0}")]
    Storage(#[from] StorageError),
}

impl HandlerError {
    /// Message reported in the 500 result.
    pub fn result_message(&self) -> &'static str {
        match self {
            Self::InvalidEvent => "Invalid upload event",
            Self::Extraction(ExtractionError::Ocr(_)) => "Error calling OCR service",
            Self::Extraction(ExtractionError::Read(_)) => "Error reading document",
            Self::Extraction(ExtractionError::Decode(_)) => "Document is not valid UTF-8 text",
            Self::Pipeline(PipelineError::Completion { .. }) => "Error calling completion service",
            Self::Pipeline(PipelineError::EmptyDocument) => "Document contains no text",
            Self::Pipeline(_) => "Error processing document",
            Self::Storage(_) => "Error writing result",
        }
    }
}

/// Destination key for a pipeline result.
///
/// A leading `documents/` is replaced by the pipeline prefix (or the prefix is prepended), and
/// the final segment is forced to a `.txt` extension.
pub fn output_key(kind: PipelineKind, key: &str) -> String {
    let prefix = kind.output_prefix();
    let mut output = match key.strip_prefix(INPUT_PREFIX) {
        Some(rest) => format!("{prefix}{rest}"),
        None => format!("{prefix}{key}"),
    };
    if !output.ends_with(".txt") {
        let segment_start = output.rfind('/').map_or(0, |slash| slash + 1);
        if let Some(dot) = output[segment_start..].rfind('.').filter(|&dot| dot > 0) {
            output.truncate(segment_start + dot);
        }
        output.push_str(".txt");
    }
    output
}

/// A written pipeline result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDocument {
    /// Bucket the result was written to.
    pub bucket: String,
    /// Key the result was written under.
    pub output_key: String,
    /// Pipeline output that was written.
    pub output: PipelineOutput,
}

/// Entry point shared by the HTTP surface and the CLI.
#[async_trait]
pub trait InvocationApi: Send + Sync {
    /// Run one invocation and report its result.
    async fn handle(&self, kind: PipelineKind, event: &UploadEvent) -> InvocationResult;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Wires storage, text detection and the pipelines together.
#[derive(Clone)]
pub struct DocumentHandler {
    store: Arc<dyn ObjectStore>,
    detector: Arc<dyn TextDetector>,
    pipeline: DocumentPipeline,
    metrics: Arc<PipelineMetrics>,
}

impl DocumentHandler {
    /// Create a handler with fresh metrics.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        detector: Arc<dyn TextDetector>,
        pipeline: DocumentPipeline,
    ) -> Self {
        Self {
            store,
            detector,
            pipeline,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Run one invocation, propagating the typed error instead of a result message.
    pub async fn process(
        &self,
        kind: PipelineKind,
        event: &UploadEvent,
    ) -> Result<ProcessedDocument, HandlerError> {
        let (bucket, key) = event.location().ok_or(HandlerError::InvalidEvent)?;
        tracing::info!(bucket, key, "Processing upload");

        let text = self.extract_text(bucket, key).await?;
        let output = self.pipeline.run(kind, text).await?;

        let output_key = output_key(kind, key);
        self.store
            .put_object(bucket, &output_key, output.text.clone().into_bytes(), TEXT_PLAIN)
            .await?;
        tracing::info!(
            stage = %PipelineStage::Written,
            bucket,
            key = %output_key,
            chunks = output.chunk_count,
            completion_calls = output.completion_calls,
            "Result written"
        );

        Ok(ProcessedDocument {
            bucket: bucket.to_string(),
            output_key,
            output,
        })
    }

    async fn extract_text(&self, bucket: &str, key: &str) -> Result<String, ExtractionError> {
        let object = self
            .store
            .get_object(bucket, key)
            .await
            .map_err(ExtractionError::Read)?;
        let content_type = media_type(&object.content_type);
        tracing::info!(
            key,
            content_type = %content_type,
            bytes = object.body.len(),
            "Fetched source object"
        );

        if OCR_CONTENT_TYPES.contains(&content_type.as_str()) {
            tracing::info!(key, "Image or PDF detected; calling OCR service");
            let blocks = self.detector.detect_text(bucket, key).await.inspect_err(|error| {
                tracing::error!(
                    key,
                    error = %error,
                    "OCR failed; inputs must be single-page PDF, PNG or JPEG"
                );
            })?;
            return Ok(lines_to_text(&blocks));
        }

        Ok(String::from_utf8(object.body)?)
    }
}

#[async_trait]
impl InvocationApi for DocumentHandler {
    async fn handle(&self, kind: PipelineKind, event: &UploadEvent) -> InvocationResult {
        let span = tracing::info_span!("invocation", id = %Uuid::new_v4(), pipeline = %kind);
        async move {
            match self.process(kind, event).await {
                Ok(processed) => {
                    self.metrics.record_success(
                        processed.output.chunk_count as u64,
                        processed.output.completion_calls as u64,
                    );
                    InvocationResult::success(kind.success_message())
                }
                Err(error) => {
                    self.metrics.record_failure();
                    tracing::error!(
                        stage = %PipelineStage::Failed,
                        error = %error,
                        "Invocation failed"
                    );
                    InvocationResult::failure(error.result_message())
                }
            }
        }
        .instrument(span)
        .await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Lowercased media type without parameters (`text/plain; charset=utf-8` -> `text/plain`).
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
