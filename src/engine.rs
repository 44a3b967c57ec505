//! The retrieval engine service object.
//!
//! [`SearchEngine`] owns the vector cache and holds handles to its
//! collaborators (embedding provider, content repository, relationship
//! store). It is constructed once and shared by reference; there is no
//! global state.
//!
//! # Pipeline
//!
//! ```text
//! SearchRequest
//!   │ validate filters
//!   ▼
//! VectorCache::ensure_fresh(owner)        (or repository.list_by_filters when direct)
//!   ▼
//! provider.embed(query)  ── timeout / failure ──▶ EmbeddingUnavailable
//!   ▼
//! rank_candidates        owner → type → age → cosine → threshold → top `limit`
//!   ▼
//! apply_project_relevance  direct / related / neutral, decay, re-sort by final_score
//!   ▼
//! assemble_context (RAG only) ─▶ summarize
//! ```
//!
//! The limit is applied by similarity, before relevance weighting, so
//! weighting only reorders the similarity top-N. The full thresholded set
//! is weighted separately and kept as `all_scored` for insights.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use recall_core::assemble::{assemble_context, CompressionStats, ContextSource};
use recall_core::embedding::has_expected_dims;
use recall_core::insights::{summarize, SearchInsights};
use recall_core::models::{
    CacheEntry, ContentType, ProjectRelationship, SearchFilters, SearchResult, EMBEDDING_DIMS,
};
use recall_core::relevance::{apply_project_relevance, RelevanceOptions};
use recall_core::search::rank_candidates;

use crate::cache::{CacheSettings, VectorCache};
use crate::config::{Config, RetrievalConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{ProviderError, RecallError, Result};
use crate::repository::{ContentQuery, ContentRepository, RelationshipStore};

/// Everything the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub cache: CacheSettings,
    pub relevance: RelevanceOptions,
    /// Upper bound on one query or chunk embedding call, retries included.
    pub embed_timeout: Duration,
    pub max_input_chars: usize,
    pub max_chunk_size: usize,
    pub min_chunk_chars: usize,
    /// Concurrent embedding calls during ingestion.
    pub ingest_concurrency: usize,
    pub retrieval: RetrievalDefaults,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache: CacheSettings::from(&config.cache),
            relevance: RelevanceOptions {
                direct_match_boost: config.retrieval.direct_match_boost,
                temporal_decay: config.retrieval.temporal_decay,
                ..RelevanceOptions::default()
            },
            embed_timeout: embedding::call_budget(&config.embedding),
            max_input_chars: config.embedding.max_input_chars,
            max_chunk_size: config.chunking.max_chunk_size,
            min_chunk_chars: config.chunking.min_chunk_chars,
            ingest_concurrency: config.cache.fetch_concurrency.max(1),
            retrieval: RetrievalDefaults::from(&config.retrieval),
        }
    }
}

/// Request defaults from `[retrieval]`, applied to fields a caller leaves
/// unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalDefaults {
    pub threshold: f32,
    pub limit: usize,
    pub max_tokens: usize,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalDefaults {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            threshold: config.threshold,
            limit: config.limit,
            max_tokens: config.max_tokens,
        }
    }
}

/// One similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub content_types: Option<Vec<ContentType>>,
    pub max_age_days: Option<u32>,
    pub threshold: f32,
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::with_defaults(query, owner_id, &RetrievalDefaults::default())
    }

    pub fn with_defaults(
        query: impl Into<String>,
        owner_id: impl Into<String>,
        defaults: &RetrievalDefaults,
    ) -> Self {
        Self {
            query: query.into(),
            owner_id: owner_id.into(),
            project_id: None,
            content_types: None,
            max_age_days: None,
            threshold: defaults.threshold,
            limit: defaults.limit,
        }
    }

    /// Validate and convert to core filters.
    pub fn filters(&self) -> Result<SearchFilters> {
        if self.owner_id.trim().is_empty() {
            return Err(RecallError::config("owner_id must not be empty"));
        }
        if self.query.trim().is_empty() {
            return Err(RecallError::config("query must not be empty"));
        }
        if self.limit < 1 {
            return Err(RecallError::config("limit must be >= 1"));
        }
        if !self.threshold.is_finite() || !(-1.0..=1.0).contains(&self.threshold) {
            return Err(RecallError::config(format!(
                "threshold must be within [-1, 1], got {}",
                self.threshold
            )));
        }
        if let Some(types) = &self.content_types {
            if types.is_empty() {
                return Err(RecallError::config("content_types must not be an empty list"));
            }
        }
        Ok(SearchFilters {
            owner_id: self.owner_id.clone(),
            content_types: self.content_types.clone(),
            max_age_days: self.max_age_days,
            similarity_threshold: self.threshold,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Entries available before filtering (cache snapshot or direct listing).
    pub total_candidates: usize,
    /// Entries that passed owner, type and age filters and were scored.
    pub searched: usize,
    /// Results returned, or sources included in the context for RAG queries.
    pub included: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    /// Every thresholded candidate, relevance-weighted, without the limit.
    #[serde(skip)]
    pub all_scored: Vec<SearchResult>,
    pub stats: SearchStats,
    pub insights: SearchInsights,
}

/// Input to [`SearchEngine::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct RagQuery {
    pub question: String,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub max_tokens: usize,
    pub threshold: f32,
    pub limit: usize,
    pub include_types: Option<Vec<ContentType>>,
    pub max_age_days: Option<u32>,
    /// Skip the cache and search the project directly.
    pub direct: bool,
}

impl RagQuery {
    pub fn new(question: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::with_defaults(question, owner_id, &RetrievalDefaults::default())
    }

    pub fn with_defaults(
        question: impl Into<String>,
        owner_id: impl Into<String>,
        defaults: &RetrievalDefaults,
    ) -> Self {
        Self {
            question: question.into(),
            owner_id: owner_id.into(),
            project_id: None,
            max_tokens: defaults.max_tokens,
            threshold: defaults.threshold,
            limit: defaults.limit,
            include_types: None,
            max_age_days: None,
            direct: false,
        }
    }

    fn search_request(&self) -> SearchRequest {
        SearchRequest {
            query: self.question.clone(),
            owner_id: self.owner_id.clone(),
            project_id: self.project_id.clone(),
            content_types: self.include_types.clone(),
            max_age_days: self.max_age_days,
            threshold: self.threshold,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    /// Present only when an [`AnswerGenerator`] was supplied.
    pub answer: Option<String>,
    pub context: String,
    pub sources: Vec<ContextSource>,
    pub compression_stats: CompressionStats,
    pub search_stats: SearchStats,
    pub insights: SearchInsights,
}

/// Turns an assembled context into a natural-language answer.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> Result<String>;
}

/// Project-aware semantic retrieval over one content repository.
pub struct SearchEngine {
    pub(crate) provider: Arc<dyn EmbeddingProvider>,
    pub(crate) repository: Arc<dyn ContentRepository>,
    pub(crate) relationships: Arc<dyn RelationshipStore>,
    pub(crate) cache: VectorCache,
    pub(crate) settings: EngineSettings,
}

impl SearchEngine {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        repository: Arc<dyn ContentRepository>,
        relationships: Arc<dyn RelationshipStore>,
        settings: EngineSettings,
    ) -> Self {
        let cache = VectorCache::new(Arc::clone(&repository), settings.cache.clone());
        Self {
            provider,
            repository,
            relationships,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &VectorCache {
        &self.cache
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Search the owner's cached entries.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let filters = request.filters()?;
        let snapshot = self.cache.ensure_fresh(&request.owner_id).await?;
        let embedding = self.embed_query(&request.query).await?;
        self.rank(request, &filters, snapshot.entries(), &embedding)
            .await
    }

    /// Search straight from the repository, bypassing the cache.
    ///
    /// Scoped to `request.project_id` when set.
    pub async fn search_direct(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let filters = request.filters()?;
        let query = ContentQuery {
            project_id: request.project_id.clone(),
            content_types: request.content_types.clone(),
            created_after: request
                .max_age_days
                .map(|d| Utc::now() - ChronoDuration::days(d as i64)),
            embedded_only: true,
        };
        let items = self
            .repository
            .list_by_filters(&request.owner_id, &query)
            .await?;
        let entries: Vec<Arc<CacheEntry>> = items
            .into_iter()
            .map(|item| Arc::new(CacheEntry::from(item)))
            .collect();

        let embedding = self.embed_query(&request.query).await?;
        self.rank(request, &filters, &entries, &embedding).await
    }

    async fn rank(
        &self,
        request: &SearchRequest,
        filters: &SearchFilters,
        entries: &[Arc<CacheEntry>],
        embedding: &[f32],
    ) -> Result<SearchOutcome> {
        let now = Utc::now();
        let unlimited = SearchFilters {
            limit: usize::MAX,
            ..filters.clone()
        };
        // One scoring pass; the similarity-ordered list is truncated for the
        // results and kept whole for insights.
        let ranked = rank_candidates(entries, embedding, &unlimited, now);
        let top: Vec<SearchResult> = ranked.results.iter().take(filters.limit).cloned().collect();

        let project = request.project_id.as_deref();
        let relationships = self.outgoing_relationships(project).await;
        let relevance = &self.settings.relevance;
        let results = apply_project_relevance(top, project, &relationships, relevance, now);
        let all_scored =
            apply_project_relevance(ranked.results, project, &relationships, relevance, now);

        let stats = SearchStats {
            total_candidates: entries.len(),
            searched: ranked.searched,
            included: results.len(),
        };
        let insights = summarize(
            &request.query,
            request.project_id.as_deref(),
            &results,
            &all_scored,
        );

        tracing::debug!(
            owner_id = %request.owner_id,
            total_candidates = stats.total_candidates,
            searched = stats.searched,
            scored = all_scored.len(),
            returned = stats.included,
            "search complete"
        );

        Ok(SearchOutcome {
            results,
            all_scored,
            stats,
            insights,
        })
    }

    /// Relationship lookups are best-effort: on failure the search proceeds
    /// with every other project treated as unrelated.
    async fn outgoing_relationships(&self, project_id: Option<&str>) -> Vec<ProjectRelationship> {
        let Some(project_id) = project_id else {
            return Vec::new();
        };
        match self.relationships.get_outgoing(project_id).await {
            Ok(relationships) => relationships,
            Err(e) => {
                tracing::warn!(project_id, error = %e, "relationship lookup failed; ranking without related projects");
                Vec::new()
            }
        }
    }

    /// Embed a query. Any failure, timeout, or wrong-sized vector is
    /// [`RecallError::EmbeddingUnavailable`].
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_timeout(text)
            .await
            .map_err(|e| RecallError::EmbeddingUnavailable(e.to_string()))
    }

    /// Embed with the configured timeout and check dimensionality.
    pub(crate) async fn embed_with_timeout(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = tokio::time::timeout(
            self.settings.embed_timeout,
            self.provider.embed(text, self.settings.max_input_chars),
        )
        .await
        .map_err(|_| RecallError::from(ProviderError::Timeout(self.settings.embed_timeout.as_secs())))??;

        if !has_expected_dims(&embedding) {
            return Err(RecallError::DimensionMismatch {
                expected: EMBEDDING_DIMS,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    /// Retrieve, rank and assemble a bounded context for `query`, then
    /// hand it to `generator` when one is supplied.
    pub async fn query(
        &self,
        query: &RagQuery,
        generator: Option<&dyn AnswerGenerator>,
    ) -> Result<RagResponse> {
        if query.max_tokens < 1 {
            return Err(RecallError::config("max_tokens must be >= 1"));
        }

        let request = query.search_request();
        let outcome = if query.direct {
            self.search_direct(&request).await?
        } else {
            self.search(&request).await?
        };

        let assembled = assemble_context(&outcome.results, query.max_tokens);
        if assembled.skipped > 0 {
            tracing::debug!(
                skipped = assembled.skipped,
                max_tokens = query.max_tokens,
                "context budget exhausted"
            );
        }

        let answer = match generator {
            Some(generator) if !assembled.sources.is_empty() => {
                Some(generator.generate(&query.question, &assembled.context).await?)
            }
            _ => None,
        };

        Ok(RagResponse {
            answer,
            search_stats: SearchStats {
                included: assembled.sources.len(),
                ..outcome.stats
            },
            context: assembled.context,
            sources: assembled.sources,
            compression_stats: assembled.stats,
            insights: outcome.insights,
        })
    }
}
