//! Project-aware relevance weighting.
//!
//! Augments raw similarity with organizational relevance (same project,
//! related project, unrelated) and a bounded recency decay, then re-ranks
//! by a fixed composite score.
//!
//! # Rules
//!
//! | Result project | `project_relevance` | Similarity | Context |
//! |----------------|---------------------|------------|---------|
//! | requesting project | `1.0` | × `direct_match_boost` | `DirectMatch` |
//! | related via an outgoing edge | `0.3 + confidence × 0.4` | unchanged | `Related` |
//! | none / unrelated | `0.5` | unchanged | none |
//!
//! With temporal decay enabled, relevance is multiplied by
//! `0.7 + 0.3 × exp(-age_days / 30)`, so it never drops below 70% of its
//! pre-decay value.
//!
//! ```text
//! final_score = project_relevance × 0.4 + weighted_similarity × 0.6
//! ```

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::models::{ProjectContext, ProjectRelationship, SearchResult};

/// Weight of project relevance in the composite score.
pub const PROJECT_WEIGHT: f32 = 0.4;
/// Weight of similarity in the composite score.
pub const SIMILARITY_WEIGHT: f32 = 0.6;
/// Relevance for results with no project or an unrelated one.
pub const NEUTRAL_RELEVANCE: f32 = 0.5;
pub const DEFAULT_DIRECT_MATCH_BOOST: f32 = 1.3;
pub const DEFAULT_DECAY_DAYS: f64 = 30.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Caller-tunable knobs. The composite weights are not among them.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceOptions {
    /// Multiplier applied to similarity for same-project results.
    pub direct_match_boost: f32,
    /// Apply the recency decay to `project_relevance`.
    pub temporal_decay: bool,
    /// Decay time constant in days.
    pub decay_days: f64,
}

impl Default for RelevanceOptions {
    fn default() -> Self {
        Self {
            direct_match_boost: DEFAULT_DIRECT_MATCH_BOOST,
            temporal_decay: true,
            decay_days: DEFAULT_DECAY_DAYS,
        }
    }
}

/// Relevance of a result from a related project: `[0.3, 0.7]`.
pub fn related_relevance(confidence: f32) -> f32 {
    0.3 + confidence.clamp(0.0, 1.0) * 0.4
}

/// Recency multiplier in `(0.7, 1.0]`. Future-dated items count as age 0.
pub fn decay_factor(created_at: DateTime<Utc>, now: DateTime<Utc>, decay_days: f64) -> f32 {
    let age_secs = now.signed_duration_since(created_at).num_seconds().max(0) as f64;
    let age_days = age_secs / SECONDS_PER_DAY;
    let decay = (-age_days / decay_days).exp();
    (0.7 + 0.3 * decay) as f32
}

pub fn final_score(project_relevance: f32, similarity: f32) -> f32 {
    project_relevance * PROJECT_WEIGHT + similarity * SIMILARITY_WEIGHT
}

/// Populate relevance fields on every result and re-rank by `final_score`.
///
/// `relationships` are the requesting project's outgoing edges; edges from
/// other sources are ignored. Ties fall back to most recent first, then id.
pub fn apply_project_relevance(
    mut results: Vec<SearchResult>,
    requesting_project: Option<&str>,
    relationships: &[ProjectRelationship],
    options: &RelevanceOptions,
    now: DateTime<Utc>,
) -> Vec<SearchResult> {
    for result in results.iter_mut() {
        let (relevance, weighted, context) =
            classify(result, requesting_project, relationships, options);

        let relevance = if options.temporal_decay {
            relevance * decay_factor(result.entry.created_at, now, options.decay_days)
        } else {
            relevance
        };

        result.project_relevance = relevance;
        result.weighted_similarity = weighted;
        result.project_context = context;
        result.final_score = final_score(relevance, weighted);
    }

    results.sort_by(compare_by_final_score);
    results
}

fn classify(
    result: &SearchResult,
    requesting_project: Option<&str>,
    relationships: &[ProjectRelationship],
    options: &RelevanceOptions,
) -> (f32, f32, Option<ProjectContext>) {
    let neutral = (NEUTRAL_RELEVANCE, result.similarity, None);

    let (Some(requesting), Some(project)) = (requesting_project, result.entry.project_id.as_deref())
    else {
        return neutral;
    };

    if project == requesting {
        return (
            1.0,
            result.similarity * options.direct_match_boost,
            Some(ProjectContext::DirectMatch),
        );
    }

    match relationships
        .iter()
        .find(|r| r.source_id == requesting && r.target_id == project)
    {
        Some(rel) => (
            related_relevance(rel.confidence),
            result.similarity,
            Some(ProjectContext::Related {
                relationship_type: rel.relationship_type.clone(),
                confidence: rel.confidence,
            }),
        ),
        None => neutral,
    }
}

/// Order by final score (desc), then most recent first, then id (asc).
pub fn compare_by_final_score(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then(b.entry.created_at.cmp(&a.entry.created_at))
        .then(a.entry.id.cmp(&b.entry.id))
}
