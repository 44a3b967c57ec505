//! Token-budgeted context assembly.
//!
//! Greedily packs ranked search results into a single context string for
//! a downstream answer-generation model, recording how much of the
//! selected content was discarded along the way.
//!
//! # Budget
//!
//! 40% of `max_tokens` is reserved for the question/answer exchange, so
//! the context may use at most `floor(0.6 × max_tokens)` tokens. Token cost
//! is approximated as `ceil(bytes / 4)` and measured over the whole emitted
//! block (header included), which bounds the emitted size by
//! `0.6 × max_tokens × 4` bytes.
//!
//! Running out of budget is not an error: candidates that do not fit are
//! skipped (a later, smaller one may still fit) and the shortfall shows up
//! in [`CompressionStats`] and [`AssembledContext::skipped`].

use serde::Serialize;

use crate::models::{ContentType, SearchResult};

/// Share of `max_tokens` available to retrieved context.
pub const CONTEXT_SHARE: f64 = 0.6;
/// Approximate bytes per token.
pub const CHARS_PER_TOKEN: usize = 4;
/// Per-item body cap, in characters.
pub const MAX_ITEM_CHARS: usize = 800;

/// A result that made it into the context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSource {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    pub project_id: Option<String>,
    pub similarity: f32,
    pub final_score: f32,
}

/// Size accounting for an assembled context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionStats {
    /// Sum of the full (untruncated) body sizes of included sources, in bytes.
    pub original_context_size: usize,
    /// Byte length of the emitted context string.
    pub compressed_size: usize,
    /// `compressed_size / max(original_context_size, 1)`.
    pub compression_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub context: String,
    pub sources: Vec<ContextSource>,
    pub stats: CompressionStats,
    /// Candidates left out because they did not fit the budget.
    pub skipped: usize,
}

/// Tokens available to context for a given overall budget.
pub fn context_budget_tokens(max_tokens: usize) -> usize {
    (max_tokens as f64 * CONTEXT_SHARE).floor() as usize
}

/// Estimate the token count for a string: one token per 4 bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Render one context block: a header line with title and match
/// percentage, the (already truncated) body, and a blank line.
pub fn format_block(title: &str, similarity: f32, body: &str) -> String {
    let pct = (similarity * 100.0).round() as i64;
    format!("## {} ({}% match)\n{}\n\n", title, pct, body)
}

/// Assemble a context from `results` (already in rank order).
pub fn assemble_context(results: &[SearchResult], max_tokens: usize) -> AssembledContext {
    let budget = context_budget_tokens(max_tokens);
    let mut used = 0usize;
    let mut context = String::new();
    let mut sources = Vec::new();
    let mut original_context_size = 0usize;
    let mut skipped = 0usize;

    for result in results {
        let entry = &result.entry;
        let body = truncate_chars(&entry.content, MAX_ITEM_CHARS);
        let block = format_block(&entry.title, result.similarity, body);
        let cost = estimate_tokens(&block);

        if used + cost > budget {
            skipped += 1;
            continue;
        }

        used += cost;
        context.push_str(&block);
        original_context_size += entry.content.len();
        sources.push(ContextSource {
            id: entry.id.clone(),
            title: entry.title.clone(),
            content_type: entry.content_type,
            project_id: entry.project_id.clone(),
            similarity: result.similarity,
            final_score: result.final_score,
        });
    }

    let compressed_size = context.len();
    AssembledContext {
        context,
        sources,
        stats: CompressionStats {
            original_context_size,
            compressed_size,
            compression_ratio: compressed_size as f64 / original_context_size.max(1) as f64,
        },
        skipped,
    }
}
