//! Per-chunk completion calls and the strategies that merge their results.
//!
//! Masking concatenates stripped completions in chunk order. Summarization either stuffs a
//! single chunk into one prompt or maps every chunk to a summary and combines the summaries
//! with one final call. The combine step is never re-chunked: a two-level reduction is the
//! deepest this pipeline goes.

use crate::completion::{CompletionClient, CompletionRequest};

use super::pipeline::PipelineStage;
use super::prompts::{TemplateKind, build_prompt, strip_delimiters};
use super::tokens::TokenEstimator;
use super::types::{Chunk, Completion, PipelineError};

/// Issue one completion call for `chunk_index`. Errors are fatal for the document.
pub async fn invoke(
    client: &dyn CompletionClient,
    prompt: String,
    max_output_tokens: usize,
    chunk_index: usize,
) -> Result<Completion, PipelineError> {
    tracing::debug!(
        chunk = chunk_index,
        max_output_tokens,
        prompt_bytes = prompt.len(),
        "Requesting completion"
    );
    let text = client
        .complete(CompletionRequest {
            prompt,
            max_output_tokens,
        })
        .await
        .map_err(|source| {
            tracing::error!(chunk = chunk_index, error = %source, "Completion call failed");
            PipelineError::Completion {
                chunk: chunk_index,
                source,
            }
        })?;
    Ok(Completion { chunk_index, text })
}

/// Strip response tags from each completion and join them in chunk order, without separators.
pub fn concatenate(kind: TemplateKind, mut completions: Vec<Completion>) -> String {
    completions.sort_by_key(|completion| completion.chunk_index);
    completions
        .iter()
        .map(|completion| strip_delimiters(kind, &completion.text))
        .collect()
}

/// Mask every chunk sequentially and concatenate the results.
///
/// Each call may emit as many tokens as its chunk holds plus `output_token_buffer`, since the
/// masked text is roughly the size of its input.
pub(crate) async fn mask_chunks(
    client: &dyn CompletionClient,
    chunks: &[Chunk],
    output_token_buffer: usize,
) -> Result<String, PipelineError> {
    let mut completions = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let prompt = build_prompt(TemplateKind::Mask, &chunk.text, None)?;
        let completion = invoke(
            client,
            prompt,
            chunk.tokens + output_token_buffer,
            chunk.index,
        )
        .await?;
        completions.push(completion);
    }
    Ok(concatenate(TemplateKind::Mask, completions))
}

/// Limits applied to every summarization call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SummaryLimits {
    /// Output budget for every call (summary target plus buffer).
    pub max_output_tokens: usize,
    /// Token budget the combine input is expected to fit in.
    pub input_budget: usize,
}

/// Outcome of a summarization run.
#[derive(Debug, Clone)]
pub(crate) struct SummaryOutcome {
    pub summary: String,
    pub calls: usize,
}

/// Summarize chunks with the stuff strategy (one chunk) or map then combine (several).
pub(crate) async fn summarize_chunks(
    client: &dyn CompletionClient,
    chunks: &[Chunk],
    example: &str,
    limits: SummaryLimits,
    estimator: &TokenEstimator,
) -> Result<SummaryOutcome, PipelineError> {
    if let [single] = chunks {
        tracing::info!(stage = %PipelineStage::Stuffed, "Summarizing single chunk");
        let prompt = build_prompt(TemplateKind::StuffSummarize, &single.text, Some(example))?;
        let completion = invoke(client, prompt, limits.max_output_tokens, single.index).await?;
        return Ok(SummaryOutcome {
            summary: finish_summary(TemplateKind::StuffSummarize, &completion.text),
            calls: 1,
        });
    }

    let mut partials = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let prompt = build_prompt(TemplateKind::MapSummarize, &chunk.text, Some(example))?;
        let completion = invoke(client, prompt, limits.max_output_tokens, chunk.index).await?;
        partials.push(finish_summary(TemplateKind::MapSummarize, &completion.text));
    }
    tracing::info!(
        stage = %PipelineStage::Mapped,
        summaries = partials.len(),
        "Mapped chunk summaries"
    );

    let combined_input = partials.join("\n");
    let combined_tokens = estimator.estimate(&combined_input);
    if combined_tokens > limits.input_budget {
        tracing::warn!(
            tokens = combined_tokens,
            budget = limits.input_budget,
            "Combined summaries exceed the input budget; combining anyway"
        );
    }

    let prompt = build_prompt(TemplateKind::CombineSummarize, &combined_input, Some(example))?;
    let completion = invoke(client, prompt, limits.max_output_tokens, chunks.len()).await?;
    tracing::info!(stage = %PipelineStage::Combined, "Combined chunk summaries");
    Ok(SummaryOutcome {
        summary: finish_summary(TemplateKind::CombineSummarize, &completion.text),
        calls: chunks.len() + 1,
    })
}

fn finish_summary(kind: TemplateKind, completion: &str) -> String {
    strip_delimiters(kind, completion).trim().to_string()
}
