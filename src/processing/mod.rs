//! Document processing: token estimation, chunking, prompting, and result combination.

pub mod chunking;
pub mod combine;
mod pipeline;
pub mod prompts;
pub mod tokens;
pub mod types;

pub use chunking::split_text;
pub use pipeline::{
    ContextBudget, DocumentPipeline, PipelineKind, PipelineOutput, PipelineStage,
};
pub use prompts::{DEFAULT_SUMMARY_EXAMPLE, TemplateKind, build_prompt, strip_delimiters};
pub use tokens::{TokenEstimator, estimated_chunk_count};
pub use types::{Chunk, ChunkingError, Completion, Document, PipelineError, PromptError};
