//! Similarity search over cached entries.
//!
//! The ranking pass is pure: it takes a snapshot of cache entries, a query
//! embedding, [`SearchFilters`], and the current time, and returns the
//! thresholded, ordered candidates. The calling application is responsible
//! for refreshing the cache and embedding the query.
//!
//! # Algorithm
//!
//! 1. Skip entries not owned by `filters.owner_id`.
//! 2. Skip entries whose content type is not in the allow-list (if any).
//! 3. Skip entries older than `max_age_days` (if set).
//! 4. Score the rest with cosine similarity; drop those below the threshold.
//! 5. Sort by similarity (desc), created_at (desc), id (asc).
//! 6. Truncate to `limit`.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::embedding::cosine_similarity;
use crate::models::{CacheEntry, SearchFilters, SearchResult};

/// Output of [`rank_candidates`].
#[derive(Debug, Clone)]
pub struct RankedCandidates {
    /// Thresholded results in rank order, at most `limit` long.
    pub results: Vec<SearchResult>,
    /// Entries that passed the ownership, type and age filters and were scored.
    pub searched: usize,
}

/// Score and rank `entries` against `query_embedding`.
///
/// Entries whose embedding length differs from the query's score `0.0`
/// and are therefore dropped by any positive threshold.
pub fn rank_candidates(
    entries: &[Arc<CacheEntry>],
    query_embedding: &[f32],
    filters: &SearchFilters,
    now: DateTime<Utc>,
) -> RankedCandidates {
    let max_age = filters.max_age_days.map(|d| Duration::days(d as i64));
    let mut searched = 0usize;

    let mut results: Vec<SearchResult> = entries
        .iter()
        .filter(|e| e.owner_id == filters.owner_id)
        .filter(|e| match &filters.content_types {
            Some(types) => types.contains(&e.content_type),
            None => true,
        })
        .filter(|e| match max_age {
            Some(max_age) => now.signed_duration_since(e.created_at) <= max_age,
            None => true,
        })
        .filter_map(|e| {
            searched += 1;
            let sim = cosine_similarity(query_embedding, &e.embedding);
            if sim >= filters.similarity_threshold {
                Some(SearchResult::new(Arc::clone(e), sim))
            } else {
                None
            }
        })
        .collect();

    results.sort_by(compare_by_similarity);
    results.truncate(filters.limit);

    RankedCandidates { results, searched }
}

/// Order by similarity (desc), then most recent first, then id (asc).
pub fn compare_by_similarity(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then(b.entry.created_at.cmp(&a.entry.created_at))
        .then(a.entry.id.cmp(&b.entry.id))
}
