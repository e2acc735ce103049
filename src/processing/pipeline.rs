//! Pipeline orchestration: estimate, chunk, invoke, combine.

use crate::completion::CompletionClient;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use super::chunking::split_text;
use super::combine::{SummaryLimits, mask_chunks, summarize_chunks};
use super::prompts::DEFAULT_SUMMARY_EXAMPLE;
use super::tokens::{TokenEstimator, estimated_chunk_count};
use super::types::{Document, PipelineError};

/// Token budgets derived from the completion model's context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ContextBudget {
    /// Combined input and output capacity of one completion call.
    pub context_window: usize,
    /// Over-estimate of the instruction text surrounding a chunk.
    pub prompt_tokens: usize,
    /// Extra output tokens granted so completions are not cut off.
    pub output_token_buffer: usize,
    /// Target length of a summary, in tokens.
    pub max_summary_length: usize,
    /// Replaces both derived chunk budgets when set.
    pub chunk_size_override: Option<usize>,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            context_window: 100_000,
            prompt_tokens: 500,
            output_token_buffer: 100,
            max_summary_length: 300,
            chunk_size_override: None,
        }
    }
}

impl ContextBudget {
    /// Chunk budget for masking. Output is about as long as input, so half the window is
    /// reserved for it.
    pub fn mask_chunk_size(&self) -> usize {
        self.chunk_size_override.unwrap_or_else(|| {
            (self.context_window / 2).saturating_sub(self.prompt_tokens)
        })
    }

    /// Chunk budget for summarization: everything not taken by the prompt and the summary.
    pub fn summary_chunk_size(&self) -> usize {
        self.chunk_size_override.unwrap_or_else(|| {
            self.context_window
                .saturating_sub(self.prompt_tokens)
                .saturating_sub(self.max_summary_length)
                .saturating_sub(self.output_token_buffer)
        })
    }

    /// Output budget for every summarization call.
    pub fn summary_output_tokens(&self) -> usize {
        self.max_summary_length + self.output_token_buffer
    }
}

/// The two pipeline strategies sharing estimation and chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Redact PII chunk by chunk and concatenate the results.
    Mask,
    /// Summarize with the stuff or map-reduce strategy.
    Summarize,
}

impl PipelineKind {
    /// Storage prefix results are written under.
    pub fn output_prefix(self) -> &'static str {
        match self {
            Self::Mask => "masked/",
            Self::Summarize => "summaries/",
        }
    }

    /// Message returned with a successful invocation.
    pub fn success_message(self) -> &'static str {
        match self {
            Self::Mask => "Document masked successfully!",
            Self::Summarize => "Summary created successfully!",
        }
    }

    /// Per-chunk token budget for this pipeline.
    pub fn chunk_size(self, budget: &ContextBudget) -> usize {
        match self {
            Self::Mask => budget.mask_chunk_size(),
            Self::Summarize => budget.summary_chunk_size(),
        }
    }

    /// Overlap between adjacent chunks: none for masking, about 1% for summaries.
    pub fn overlap(self, chunk_size: usize) -> usize {
        match self {
            Self::Mask => 0,
            Self::Summarize => chunk_size / 100,
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mask => "mask",
            Self::Summarize => "summarize",
        })
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mask" | "masking" => Ok(Self::Mask),
            "summarize" | "summary" | "summarization" => Ok(Self::Summarize),
            other => Err(format!("unknown pipeline '{other}'")),
        }
    }
}

/// Progress markers for one invocation, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Text has been extracted from the source object.
    Extracted,
    /// Text has been split into chunks.
    Chunked,
    /// Single-chunk summary produced.
    Stuffed,
    /// Per-chunk summaries produced.
    Mapped,
    /// Per-chunk summaries merged.
    Combined,
    /// Result persisted.
    Written,
    /// A fatal error stopped the invocation.
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extracted => "extracted",
            Self::Chunked => "chunked",
            Self::Stuffed => "stuffed",
            Self::Mapped => "mapped",
            Self::Combined => "combined",
            Self::Written => "written",
            Self::Failed => "failed",
        })
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Masked document or final summary.
    pub text: String,
    /// Number of chunks the document was split into.
    pub chunk_count: usize,
    /// Number of completion calls issued.
    pub completion_calls: usize,
}

/// Runs masking and summarization over extracted text.
#[derive(Clone)]
pub struct DocumentPipeline {
    client: Arc<dyn CompletionClient>,
    estimator: TokenEstimator,
    budget: ContextBudget,
    example: String,
}

impl DocumentPipeline {
    /// Build a pipeline around explicit collaborators.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        estimator: TokenEstimator,
        budget: ContextBudget,
    ) -> Self {
        Self {
            client,
            estimator,
            budget,
            example: DEFAULT_SUMMARY_EXAMPLE.to_string(),
        }
    }

    /// Replace the worked example shown to summarization prompts.
    pub fn with_summary_example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }

    /// Transform `text` with the selected pipeline.
    pub async fn run(
        &self,
        kind: PipelineKind,
        text: String,
    ) -> Result<PipelineOutput, PipelineError> {
        let tokens = self.estimator.estimate(&text);
        let document = Document::new(text, tokens);
        let chunk_size = kind.chunk_size(&self.budget);
        let overlap = kind.overlap(chunk_size);
        tracing::info!(
            pipeline = %kind,
            stage = %PipelineStage::Extracted,
            tokens = document.tokens(),
            chunk_size,
            estimated_chunks = estimated_chunk_count(document.tokens(), chunk_size),
            "Document extracted"
        );

        let chunks = split_text(document.content(), chunk_size, overlap, &self.estimator)?;
        tracing::info!(
            pipeline = %kind,
            stage = %PipelineStage::Chunked,
            chunks = chunks.len(),
            overlap,
            "Document chunked"
        );

        match kind {
            PipelineKind::Mask => {
                let text =
                    mask_chunks(self.client.as_ref(), &chunks, self.budget.output_token_buffer)
                        .await?;
                Ok(PipelineOutput {
                    text,
                    chunk_count: chunks.len(),
                    completion_calls: chunks.len(),
                })
            }
            PipelineKind::Summarize => {
                if chunks.is_empty() {
                    return Err(PipelineError::EmptyDocument);
                }
                let limits = SummaryLimits {
                    max_output_tokens: self.budget.summary_output_tokens(),
                    input_budget: chunk_size,
                };
                let outcome = summarize_chunks(
                    self.client.as_ref(),
                    &chunks,
                    &self.example,
                    limits,
                    &self.estimator,
                )
                .await?;
                Ok(PipelineOutput {
                    text: outcome.summary,
                    chunk_count: chunks.len(),
                    completion_calls: outcome.calls,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, CompletionRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(request.prompt);
            Ok("<summary>Short.</summary>".to_string())
        }
    }

    fn pipeline(client: Arc<RecordingClient>) -> DocumentPipeline {
        let estimator = TokenEstimator::new("p50k_base").expect("estimator");
        DocumentPipeline::new(client, estimator, ContextBudget::default())
    }

    #[test]
    fn default_budgets_match_context_window() {
        let budget = ContextBudget::default();
        assert_eq!(budget.mask_chunk_size(), 49_500);
        assert_eq!(budget.summary_chunk_size(), 99_100);
        assert_eq!(budget.summary_output_tokens(), 400);
    }

    #[test]
    fn override_replaces_both_chunk_budgets() {
        let budget = ContextBudget {
            chunk_size_override: Some(100),
            ..ContextBudget::default()
        };
        assert_eq!(PipelineKind::Mask.chunk_size(&budget), 100);
        assert_eq!(PipelineKind::Summarize.chunk_size(&budget), 100);
    }

    #[test]
    fn only_summaries_overlap() {
        assert_eq!(PipelineKind::Mask.overlap(5_000), 0);
        assert_eq!(PipelineKind::Summarize.overlap(5_000), 50);
    }

    #[test]
    fn pipeline_kind_parses_aliases() {
        assert_eq!("Mask".parse(), Ok(PipelineKind::Mask));
        assert_eq!("summary".parse(), Ok(PipelineKind::Summarize));
        assert!("translate".parse::<PipelineKind>().is_err());
    }

    #[tokio::test]
    async fn custom_summary_example_reaches_the_prompt() {
        let client = Arc::new(RecordingClient::default());
        let pipeline = pipeline(client.clone())
            .with_summary_example("Input: a memo. Output: a one-line memo summary.");

        let output = pipeline
            .run(PipelineKind::Summarize, "A memo about the quarterly plan.".into())
            .await
            .expect("summary");

        assert_eq!(output.text, "Short.");
        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Input: a memo. Output: a one-line memo summary."));
        assert!(!prompts[0].contains(DEFAULT_SUMMARY_EXAMPLE));
    }

    #[tokio::test]
    async fn whitespace_only_document_masks_to_empty_without_calls() {
        let client = Arc::new(RecordingClient::default());

        let output = pipeline(client.clone())
            .run(PipelineKind::Mask, "\n\n  ".into())
            .await
            .expect("masked");

        assert_eq!(output.text, "");
        assert_eq!(output.chunk_count, 0);
        assert_eq!(output.completion_calls, 0);
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn whitespace_only_document_cannot_be_summarized() {
        let client = Arc::new(RecordingClient::default());

        let error = pipeline(client.clone())
            .run(PipelineKind::Summarize, " \t\n".into())
            .await
            .expect_err("empty document");

        assert!(matches!(error, PipelineError::EmptyDocument));
        assert!(client.prompts.lock().unwrap().is_empty());
    }
}
