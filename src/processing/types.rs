//! Core data types and error definitions for the processing pipelines.

use crate::completion::CompletionError;
use anyhow::Error as TokenizerError;
use thiserror::Error;

/// Raw text extracted from an uploaded object, along with its token estimate.
#[derive(Debug, Clone)]
pub struct Document {
    content: String,
    tokens: usize,
}

impl Document {
    pub(crate) fn new(content: String, tokens: usize) -> Self {
        Self { content, tokens }
    }

    /// Extracted text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Estimated token count of the whole document.
    pub fn tokens(&self) -> usize {
        self.tokens
    }
}

/// Contiguous slice of a document sized to fit one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in document order.
    pub index: usize,
    /// Chunk text, including any leading overlap copied from the previous chunk.
    pub text: String,
    /// Estimated token count of `text`.
    pub tokens: usize,
    /// Byte length of the leading overlap region; zero when chunks do not overlap.
    pub overlap_len: usize,
    /// Set when no split point could bring the chunk under the token budget.
    pub over_budget: bool,
}

impl Chunk {
    /// Text contributed by this chunk alone, without the overlap from its predecessor.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap_len..]
    }
}

/// Raw model output for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Index of the chunk the completion was produced for.
    pub chunk_index: usize,
    /// Unprocessed completion text, response delimiters included.
    pub text: String,
}

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Caller configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured encoding.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding or model name we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors produced while rendering prompt templates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    /// Summarization templates require a worked example.
    #[error("template '{0}' requires a worked example")]
    MissingExample(&'static str),
}

/// Errors emitted by the masking and summarization pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Prompt rendering failed.
    #[error("Failed to build prompt: {0}")]
    Prompt(#[from] PromptError),
    /// Completion service failed for one of the chunks.
    #[error("Completion failed for chunk {chunk}: {source}")]
    Completion {
        /// Index of the chunk whose call failed (combine calls report the chunk count).
        chunk: usize,
        /// Underlying client error.
        #[source]
        source: CompletionError,
    },
    /// Summaries cannot be produced for documents without text.
    #[error("Document contains no text to summarize")]
    EmptyDocument,
}
