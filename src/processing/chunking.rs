//! Token-budgeted recursive splitting.
//!
//! Text is cut on paragraph breaks first, then on line breaks, and finally at character
//! boundaries when a single line is still too large. Every separator stays attached to the
//! piece it terminates, so the pieces concatenate back into the input byte for byte. Pieces
//! are then merged greedily up to the budget so documents are not over-fragmented.
//!
//! Summaries may request an overlap: the token-limited tail of the previous chunk is copied
//! in front of the next one. Base chunks are cut at `budget - overlap` so the overlapped
//! chunk still fits; [`Chunk::overlap_len`] marks the copied prefix.

use super::tokens::TokenEstimator;
use super::types::{Chunk, ChunkingError};

const SEPARATORS: [&str; 2] = ["\n\n", "\n"];

type TokenCounter<'a> = &'a dyn Fn(&str) -> usize;

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    over_budget: bool,
}

/// Split `text` into ordered chunks of at most `chunk_size` estimated tokens.
///
/// - `overlap` requests a token-limited overlap between adjacent chunks (zero disables it).
/// - Returns an empty vector when the input is empty or whitespace only.
/// - Chunks only exceed the budget when a single character does; those are flagged with
///   [`Chunk::over_budget`] and logged.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    estimator: &TokenEstimator,
) -> Result<Vec<Chunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    let chunks = split_with_counter(text, chunk_size, overlap, &|segment: &str| {
        estimator.estimate(segment)
    });
    for chunk in chunks.iter().filter(|chunk| chunk.over_budget) {
        tracing::warn!(
            chunk = chunk.index,
            tokens = chunk.tokens,
            budget = chunk_size,
            "Budget overrun: no split point brings chunk under the token budget"
        );
    }
    Ok(chunks)
}

fn split_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: TokenCounter<'_>,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let overlap = overlap.min(chunk_size.saturating_sub(1));
    let base_size = chunk_size - overlap;

    let mut pieces = Vec::new();
    collect_pieces(text, 0, &SEPARATORS, base_size, counter, &mut pieces);
    let ranges = merge_pieces(text, &pieces, base_size, counter);

    let mut chunks = Vec::with_capacity(ranges.len());
    let mut previous: Option<&str> = None;
    for (index, range) in ranges.into_iter().enumerate() {
        let current = &text[range.start..range.end];
        let (chunk_text, overlap_len) = match previous {
            Some(prior) if overlap > 0 => {
                build_overlapped_chunk(prior, current, overlap, chunk_size, counter)
            }
            _ => (current.to_string(), 0),
        };
        let tokens = counter(&chunk_text);
        chunks.push(Chunk {
            index,
            over_budget: range.over_budget || tokens > chunk_size,
            text: chunk_text,
            tokens,
            overlap_len,
        });
        previous = Some(current);
    }
    chunks
}

/// Recursively break `text` into pieces that each fit `budget`.
fn collect_pieces(
    text: &str,
    offset: usize,
    separators: &[&str],
    budget: usize,
    counter: TokenCounter<'_>,
    out: &mut Vec<Piece>,
) {
    if text.is_empty() {
        return;
    }
    if counter(text) <= budget {
        out.push(Piece {
            start: offset,
            end: offset + text.len(),
            over_budget: false,
        });
        return;
    }

    let Some((separator, rest)) = separators.split_first() else {
        hard_cut(text, offset, budget, counter, out);
        return;
    };

    let mut part_offset = offset;
    for part in text.split_inclusive(separator) {
        collect_pieces(part, part_offset, rest, budget, counter, out);
        part_offset += part.len();
    }
}

/// Cut a separator-free span at character boundaries, preferring whitespace.
fn hard_cut(
    text: &str,
    offset: usize,
    budget: usize,
    counter: TokenCounter<'_>,
    out: &mut Vec<Piece>,
) {
    // Byte offsets just past each character; computed once for the whole span.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(index, ch)| index + ch.len_utf8())
        .collect();

    let mut start = 0;
    let mut first = 0;
    while first < boundaries.len() {
        let remaining = &text[start..];
        let ends = &boundaries[first..];

        let (cut, over_budget) = match largest_fitting(ends.len(), |k| {
            counter(&text[start..ends[k]]) <= budget
        }) {
            Some(k) => (
                prefer_whitespace_cut(remaining, ends[k] - start, budget, counter),
                false,
            ),
            None => (ends[0] - start, true),
        };

        out.push(Piece {
            start: offset + start,
            end: offset + start + cut,
            over_budget,
        });
        start += cut;
        first += ends.partition_point(|end| *end <= start);
    }
}

fn prefer_whitespace_cut(
    text: &str,
    cut: usize,
    budget: usize,
    counter: TokenCounter<'_>,
) -> usize {
    let prefix = &text[..cut];
    let at_word_boundary = prefix.chars().next_back().is_some_and(char::is_whitespace)
        || text[cut..].chars().next().is_some_and(char::is_whitespace);
    if cut == text.len() || at_word_boundary {
        return cut;
    }
    match prefix.char_indices().rev().find(|(_, ch)| ch.is_whitespace()) {
        Some((index, ch)) if index > 0 => {
            let candidate = index + ch.len_utf8();
            if counter(&text[..candidate]) <= budget {
                candidate
            } else {
                cut
            }
        }
        _ => cut,
    }
}

/// Greedily merge adjacent pieces while the merged text stays within `budget`.
fn merge_pieces(
    text: &str,
    pieces: &[Piece],
    budget: usize,
    counter: TokenCounter<'_>,
) -> Vec<Piece> {
    let mut merged = Vec::new();
    let mut index = 0;
    while index < pieces.len() {
        let first = pieces[index];
        let span = pieces.len() - index;
        let fitting = if first.over_budget {
            None
        } else {
            largest_fitting(span, |k| {
                counter(&text[first.start..pieces[index + k].end]) <= budget
            })
        };
        match fitting {
            Some(k) => {
                merged.push(Piece {
                    start: first.start,
                    end: pieces[index + k].end,
                    over_budget: false,
                });
                index += k + 1;
            }
            None => {
                merged.push(first);
                index += 1;
            }
        }
    }
    merged
}

/// Tail of `previous` limited to `overlap` tokens, prefixed to `current` within `chunk_size`.
///
/// The tail always starts at a word boundary. Returns the combined text and the byte length
/// of the copied prefix.
fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: TokenCounter<'_>,
) -> (String, usize) {
    // Candidate tail starts, shortest tail first.
    let starts: Vec<usize> = previous
        .char_indices()
        .filter(|(_, ch)| ch.is_whitespace())
        .map(|(index, ch)| index + ch.len_utf8())
        .filter(|start| *start < previous.len())
        .rev()
        .collect();

    let Some(longest) = largest_fitting(starts.len(), |k| {
        counter(&previous[starts[k]..]) <= overlap
    }) else {
        return (current.to_string(), 0);
    };

    for k in (0..=longest).rev() {
        let tail = &previous[starts[k]..];
        let mut combined = String::with_capacity(tail.len() + current.len());
        combined.push_str(tail);
        combined.push_str(current);
        if counter(&combined) <= chunk_size {
            return (combined, tail.len());
        }
    }
    (current.to_string(), 0)
}

/// Largest `k < len` for which `fits(k)` holds, assuming `fits` holds on a prefix of `0..len`.
///
/// Gallops from zero before bisecting so probes stay close to the answer instead of testing
/// the whole remaining text. Only indices that were actually probed are returned.
fn largest_fitting(len: usize, mut fits: impl FnMut(usize) -> bool) -> Option<usize> {
    if len == 0 || !fits(0) {
        return None;
    }

    let mut good = 0;
    let mut bad = len;
    let mut step = 1;
    while good + step < len {
        let probe = good + step;
        if fits(probe) {
            good = probe;
            step *= 2;
        } else {
            bad = probe;
            break;
        }
    }

    while bad - good > 1 {
        let mid = good + (bad - good) / 2;
        if fits(mid) {
            good = mid;
        } else {
            bad = mid;
        }
    }
    Some(good)
}
