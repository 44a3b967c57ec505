//! Post-hoc search insights.
//!
//! Summarizes a finished search for observability: how results are spread
//! across projects and content types, which other projects contributed
//! the most relevant material, a couple of quality signals, and a few
//! suggestions.
//!
//! Suggestions are **heuristic**: lexical rewrites of the query and names
//! of related projects. They are best-effort UX hints, not guaranteed to
//! improve the next search.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::{ContentType, ProjectContext, SearchResult};

pub const MAX_RELATED_PROJECTS: usize = 5;
const MAX_PROJECT_SUGGESTIONS: usize = 2;
/// Bucket name for results without a project.
pub const UNASSIGNED_PROJECT: &str = "unassigned";

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "about", "at", "be", "by", "can", "did", "do", "does", "for", "from",
    "how", "i", "in", "is", "it", "me", "my", "of", "on", "or", "our", "show", "tell", "that",
    "the", "this", "to", "was", "we", "what", "when", "where", "which", "who", "why", "with",
    "you",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultDistribution {
    pub by_project: BTreeMap<String, usize>,
    pub by_content_type: BTreeMap<ContentType, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedProjectInsight {
    pub project_id: String,
    pub mean_relevance: f32,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuality {
    pub average_similarity: f32,
    /// Fraction of returned results that belong to the requesting project.
    pub project_coverage: f32,
    pub result_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchInsights {
    pub query: String,
    pub requesting_project_id: Option<String>,
    pub distribution: ResultDistribution,
    pub related_projects: Vec<RelatedProjectInsight>,
    pub quality: SearchQuality,
    /// Heuristic hints; see the module docs.
    pub suggestions: Vec<String>,
}

/// Build insights for a finished search.
///
/// Distribution and related projects are computed over `all_scored` (every
/// thresholded candidate); quality signals over `final_results` (what the
/// caller actually got back).
pub fn summarize(
    query: &str,
    requesting_project: Option<&str>,
    final_results: &[SearchResult],
    all_scored: &[SearchResult],
) -> SearchInsights {
    let distribution = distribution(all_scored);
    let related_projects = related_projects(requesting_project, all_scored);
    let quality = quality(requesting_project, final_results);
    let suggestions = suggestions(query, final_results.is_empty(), &related_projects);

    SearchInsights {
        query: query.to_string(),
        requesting_project_id: requesting_project.map(String::from),
        distribution,
        related_projects,
        quality,
        suggestions,
    }
}

fn distribution(results: &[SearchResult]) -> ResultDistribution {
    let mut by_project = BTreeMap::new();
    let mut by_content_type = BTreeMap::new();
    for r in results {
        let project = r
            .entry
            .project_id
            .clone()
            .unwrap_or_else(|| UNASSIGNED_PROJECT.to_string());
        *by_project.entry(project).or_insert(0) += 1;
        *by_content_type.entry(r.entry.content_type).or_insert(0) += 1;
    }
    ResultDistribution {
        by_project,
        by_content_type,
    }
}

fn related_projects(
    requesting_project: Option<&str>,
    results: &[SearchResult],
) -> Vec<RelatedProjectInsight> {
    struct Acc {
        relevance_sum: f32,
        count: usize,
        relationship_type: Option<String>,
    }

    let mut by_project: HashMap<&str, Acc> = HashMap::new();
    for r in results {
        let Some(project) = r.entry.project_id.as_deref() else {
            continue;
        };
        if Some(project) == requesting_project {
            continue;
        }
        let acc = by_project.entry(project).or_insert(Acc {
            relevance_sum: 0.0,
            count: 0,
            relationship_type: None,
        });
        acc.relevance_sum += r.project_relevance;
        acc.count += 1;
        if let Some(ProjectContext::Related {
            relationship_type, ..
        }) = &r.project_context
        {
            acc.relationship_type.get_or_insert_with(|| relationship_type.clone());
        }
    }

    let mut related: Vec<RelatedProjectInsight> = by_project
        .into_iter()
        .map(|(project_id, acc)| RelatedProjectInsight {
            project_id: project_id.to_string(),
            mean_relevance: acc.relevance_sum / acc.count as f32,
            result_count: acc.count,
            relationship_type: acc.relationship_type,
        })
        .collect();

    related.sort_by(|a, b| {
        b.mean_relevance
            .partial_cmp(&a.mean_relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.result_count.cmp(&a.result_count))
            .then(a.project_id.cmp(&b.project_id))
    });
    related.truncate(MAX_RELATED_PROJECTS);
    related
}

fn quality(requesting_project: Option<&str>, results: &[SearchResult]) -> SearchQuality {
    if results.is_empty() {
        return SearchQuality {
            average_similarity: 0.0,
            project_coverage: 0.0,
            result_count: 0,
        };
    }

    let n = results.len() as f32;
    let average_similarity = results.iter().map(|r| r.similarity).sum::<f32>() / n;
    let in_project = match requesting_project {
        Some(p) => results
            .iter()
            .filter(|r| r.entry.project_id.as_deref() == Some(p))
            .count(),
        None => 0,
    };

    SearchQuality {
        average_similarity,
        project_coverage: in_project as f32 / n,
        result_count: results.len(),
    }
}

/// Lower-cased query words with punctuation and stop words removed.
pub fn query_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn suggestions(query: &str, no_results: bool, related: &[RelatedProjectInsight]) -> Vec<String> {
    let mut out = Vec::new();
    let keywords = query_keywords(query);
    let normalized: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();

    if !keywords.is_empty() && keywords != normalized {
        out.push(format!("Try keywords: \"{}\"", keywords.join(" ")));
    }
    if keywords.len() > 3 {
        out.push(format!(
            "Try a narrower query: \"{}\"",
            keywords[..keywords.len() - 1].join(" ")
        ));
    }
    if no_results {
        out.push(
            "No results above the similarity threshold; try lowering it or broadening the query"
                .to_string(),
        );
    }
    for r in related.iter().take(MAX_PROJECT_SUGGESTIONS) {
        out.push(format!("Explore related project: {}", r.project_id));
    }

    out
}
