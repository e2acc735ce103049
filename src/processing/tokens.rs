//! Token estimation backed by a fixed BPE encoding.
//!
//! The completion model's own tokenizer is not available, so counts come from a stand-in
//! `tiktoken` encoding (`p50k_base` by default). Results are only used for sizing decisions
//! and are treated as approximate upper bounds; the output-token buffer absorbs the error.

use anyhow::Error as TokenizerError;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::ChunkingError;

/// Cheap, clonable handle to the estimation encoding.
#[derive(Clone)]
pub struct TokenEstimator {
    encoding: Arc<CoreBPE>,
    name: String,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("encoding", &self.name)
            .finish()
    }
}

impl TokenEstimator {
    /// Build an estimator for an encoding name (`p50k_base`, `cl100k_base`, ...) or a model
    /// name known to `tiktoken`. Unknown names fall back to `p50k_base`.
    pub fn new(encoding: &str) -> Result<Self, ChunkingError> {
        let normalized = encoding.trim();
        let target = if normalized.is_empty() {
            "p50k_base"
        } else {
            normalized
        };
        let bpe = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
            encoding: target.to_string(),
            source,
        })?;
        Ok(Self {
            encoding: Arc::new(bpe),
            name: target.to_string(),
        })
    }

    /// Name the estimator was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Estimated number of model tokens in `text`.
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoding.encode_ordinary(text).len()
    }
}

/// Lower-bound chunk count for a document of `tokens`: `tokens / budget + 1`.
///
/// Only informative; the splitter may return a different number of chunks.
pub fn estimated_chunk_count(tokens: usize, budget: usize) -> usize {
    tokens / budget.max(1) + 1
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    if let Some(candidate) = encoding_from_name(name) {
        return candidate;
    }
    match get_bpe_from_model(name) {
        Ok(encoding) => Ok(encoding),
        Err(error) => {
            tracing::warn!(
                encoding = name,
                error = %error,
                "Unknown tokenizer; falling back to 'p50k_base' for token estimates"
            );
            p50k_base()
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}
