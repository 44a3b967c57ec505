//! End-to-end engine tests over the in-memory backends.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use recall::cache::CacheSettings;
use recall::config::Config;
use recall::embedding::EmbeddingProvider;
use recall::engine::{EngineSettings, RagQuery, SearchEngine, SearchRequest};
use recall::error::{ProviderError, RecallError, Result};
use recall::ingest::NewContent;
use recall::repository::{
    ContentQuery, ContentRepository, InMemoryRelationshipStore, InMemoryRepository,
    StoredContent,
};
use recall_core::models::{
    ContentItem, ContentMetadata, ContentType, ProjectRelationship, EMBEDDING_DIMS,
};

const QUERY: &str = "release process";
const FAIL_MARKER: &str = "FAIL";

/// Unit vector whose cosine with `axis(0)` is `similarity`.
fn vector_at(similarity: f32) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMS];
    v[0] = similarity;
    v[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
    v
}

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMS];
    v[i] = 1.0;
    v
}

/// Known texts map to fixed vectors; anything else embeds to `axis(2)`.
struct MockProvider {
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    fail_all: bool,
    latency: Option<Duration>,
}

impl MockProvider {
    fn new() -> Self {
        let mut vectors = HashMap::new();
        vectors.insert(QUERY.to_string(), axis(0));
        vectors.insert("deployment runbook".to_string(), axis(2));
        Self {
            vectors,
            calls: AtomicUsize::new(0),
            fail_all: false,
            latency: None,
        }
    }

    fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn model_name(&self) -> &str {
        "mock"
    }

    fn dims(&self) -> usize {
        EMBEDDING_DIMS
    }

    async fn embed(&self, text: &str, _max_input_chars: usize) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_all || text.contains(FAIL_MARKER) {
            return Err(ProviderError::Network("connection refused".to_string()).into());
        }
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| axis(2)))
    }
}

/// Counts how often the cache asks for eligible ids.
/// An optional delay on the listing keeps a reload in flight long enough
/// for concurrent callers to pile up behind it.
struct CountingRepository {
    inner: InMemoryRepository,
    listings: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingRepository {
    fn new() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            listings: AtomicUsize::new(0),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentRepository for CountingRepository {
    async fn list_eligible_ids(&self, owner_id: &str, cap: usize) -> Result<Vec<String>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.list_eligible_ids(owner_id, cap).await
    }

    async fn fetch(&self, id: &str) -> Result<Option<StoredContent>> {
        self.inner.fetch(id).await
    }

    async fn list_by_filters(
        &self,
        owner_id: &str,
        query: &ContentQuery,
    ) -> Result<Vec<ContentItem>> {
        self.inner.list_by_filters(owner_id, query).await
    }

    async fn insert(&self, item: &ContentItem) -> Result<()> {
        self.inner.insert(item).await
    }
}

fn item(id: &str, project: Option<&str>, similarity: f32) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        owner_id: "u1".to_string(),
        project_id: project.map(str::to_string),
        content_type: ContentType::Knowledge,
        title: format!("Title {}", id),
        body: format!("Body of {}", id),
        embedding: vector_at(similarity),
        tags: Vec::new(),
        metadata: ContentMetadata::default(),
        created_at: Utc::now(),
    }
}

struct Harness {
    engine: SearchEngine,
    repository: Arc<CountingRepository>,
    provider: Arc<MockProvider>,
}

async fn harness_with(
    items: Vec<ContentItem>,
    relationships: Vec<ProjectRelationship>,
    provider: MockProvider,
    settings: EngineSettings,
) -> Harness {
    harness_over(CountingRepository::new(), items, relationships, provider, settings).await
}

async fn harness_over(
    repository: CountingRepository,
    items: Vec<ContentItem>,
    relationships: Vec<ProjectRelationship>,
    provider: MockProvider,
    settings: EngineSettings,
) -> Harness {
    let repository = Arc::new(repository);
    for i in &items {
        repository.insert(i).await.unwrap();
    }
    let provider = Arc::new(provider);
    let engine = SearchEngine::new(
        provider.clone(),
        repository.clone(),
        Arc::new(InMemoryRelationshipStore::with_relationships(relationships).unwrap()),
        settings,
    );
    Harness {
        engine,
        repository,
        provider,
    }
}

async fn harness(items: Vec<ContentItem>) -> Harness {
    harness_with(items, Vec::new(), MockProvider::new(), EngineSettings::default()).await
}

#[tokio::test]
async fn test_best_match_ranks_first() {
    let h = harness(vec![
        item("low", None, 0.3),
        item("mid", None, 0.7),
        item("best", None, 0.99),
        item("edge", None, 0.65),
    ])
    .await;

    let outcome = h.engine.search(&SearchRequest::new(QUERY, "u1")).await.unwrap();

    let ids: Vec<&str> = outcome.results.iter().map(|r| r.entry.id.as_str()).collect();
    assert_eq!(ids, vec!["best", "mid", "edge"]);
    assert_eq!(outcome.stats.total_candidates, 4);
    assert_eq!(outcome.stats.searched, 4);
    assert_eq!(outcome.stats.included, 3);
    assert!(outcome.results.iter().all(|r| r.similarity >= 0.6));
}

#[tokio::test]
async fn test_threshold_and_limit() {
    let h = harness(vec![
        item("a", None, 0.95),
        item("b", None, 0.9),
        item("c", None, 0.85),
        item("d", None, 0.5),
    ])
    .await;

    let mut request = SearchRequest::new(QUERY, "u1");
    request.threshold = 0.88;
    let outcome = h.engine.search(&request).await.unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| r.similarity >= 0.88));

    request.threshold = 0.0;
    request.limit = 2;
    let outcome = h.engine.search(&request).await.unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.all_scored.len(), 4);
    assert_eq!(outcome.results[0].entry.id, "a");
}

#[tokio::test]
async fn test_other_owners_content_is_invisible() {
    let mut foreign = item("foreign", None, 0.99);
    foreign.owner_id = "u2".to_string();
    let h = harness(vec![item("mine", None, 0.8), foreign]).await;

    let outcome = h.engine.search(&SearchRequest::new(QUERY, "u1")).await.unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].entry.id, "mine");
}

#[tokio::test]
async fn test_repeated_search_within_ttl_is_stable() {
    let h = harness(vec![item("a", None, 0.9), item("b", None, 0.8)]).await;
    let request = SearchRequest::new(QUERY, "u1");

    let first = h.engine.search(&request).await.unwrap();
    let second = h.engine.search(&request).await.unwrap();

    let ids = |o: &recall::engine::SearchOutcome| {
        o.results
            .iter()
            .map(|r| (r.entry.id.clone(), r.similarity))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(h.repository.listings(), 1);
    assert_eq!(h.engine.cache().load_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_reloads_once_under_concurrency() {
    let settings = EngineSettings {
        cache: CacheSettings {
            ttl: Duration::from_secs(60),
            ..CacheSettings::default()
        },
        ..EngineSettings::default()
    };
    let h = harness_over(
        CountingRepository::slow(Duration::from_millis(50)),
        vec![item("a", None, 0.9)],
        Vec::new(),
        MockProvider::new(),
        settings,
    )
    .await;
    let request = SearchRequest::new(QUERY, "u1");

    h.engine.search(&request).await.unwrap();
    assert_eq!(h.repository.listings(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    let searches = (0..10).map(|_| h.engine.search(&request));
    let outcomes = futures::future::join_all(searches).await;
    for outcome in outcomes {
        assert_eq!(outcome.unwrap().results.len(), 1);
    }
    assert_eq!(h.repository.listings(), 2);
    assert_eq!(h.engine.cache().load_count(), 2);
}

#[tokio::test]
async fn test_embedding_failure_is_explicit() {
    let h = harness_with(
        vec![item("a", None, 0.9)],
        Vec::new(),
        MockProvider::failing(),
        EngineSettings::default(),
    )
    .await;

    let err = h
        .engine
        .search(&SearchRequest::new(QUERY, "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecallError::EmbeddingUnavailable(_)));

    let err = h
        .engine
        .query(&RagQuery::new(QUERY, "u1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RecallError::EmbeddingUnavailable(_)));
}

#[tokio::test(start_paused = true)]
async fn test_embed_timeout_leaves_room_for_retries() {
    let mut config = Config::default();
    config.embedding.timeout_secs = 1;
    config.embedding.max_retries = 2;
    let settings = EngineSettings::from_config(&config);
    // Three 1 s requests plus 1 s and 2 s of backoff.
    assert_eq!(settings.embed_timeout, Duration::from_secs(6));

    // Slower than one request timeout, inside the retry schedule.
    let h = harness_with(
        vec![item("a", None, 0.9)],
        Vec::new(),
        MockProvider::slow(Duration::from_secs(4)),
        settings.clone(),
    )
    .await;
    let outcome = h.engine.search(&SearchRequest::new(QUERY, "u1")).await.unwrap();
    assert_eq!(outcome.results.len(), 1);

    let h = harness_with(
        vec![item("a", None, 0.9)],
        Vec::new(),
        MockProvider::slow(Duration::from_secs(7)),
        settings,
    )
    .await;
    let err = h
        .engine
        .search(&SearchRequest::new(QUERY, "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecallError::EmbeddingUnavailable(_)));
}

#[tokio::test]
async fn test_invalid_request_does_not_embed() {
    let h = harness(vec![item("a", None, 0.9)]).await;
    let err = h
        .engine
        .search(&SearchRequest::new("   ", "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecallError::Configuration(_)));
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_direct_match_outranks_more_similar_unrelated_item() {
    let relationships = vec![ProjectRelationship {
        source_id: "alpha".to_string(),
        target_id: "beta".to_string(),
        relationship_type: "depends_on".to_string(),
        confidence: 0.9,
    }];
    let h = harness_with(
        vec![
            item("own", Some("alpha"), 0.7),
            item("related", Some("beta"), 0.75),
            item("unrelated", Some("zeta"), 0.8),
        ],
        relationships,
        MockProvider::new(),
        EngineSettings::default(),
    )
    .await;

    let mut request = SearchRequest::new(QUERY, "u1");
    request.project_id = Some("alpha".to_string());
    let outcome = h.engine.search(&request).await.unwrap();

    assert_eq!(outcome.results[0].entry.id, "own");
    assert!(outcome.results[0]
        .project_context
        .as_ref()
        .is_some_and(|c| c.is_direct_match()));
    assert!((outcome.results[0].weighted_similarity - 0.7 * 1.3).abs() < 1e-3);

    let related = outcome
        .results
        .iter()
        .find(|r| r.entry.id == "related")
        .unwrap();
    assert!(related
        .project_context
        .as_ref()
        .is_some_and(|c| c.is_related_project()));

    let unrelated = outcome
        .results
        .iter()
        .find(|r| r.entry.id == "unrelated")
        .unwrap();
    assert!(unrelated.project_context.is_none());
    assert!(outcome.results.windows(2).all(|w| w[0].final_score >= w[1].final_score));
}

#[tokio::test]
async fn test_limit_applies_before_project_weighting() {
    let h = harness(vec![
        item("unrelated", Some("zeta"), 0.95),
        item("own", Some("alpha"), 0.70),
    ])
    .await;

    let mut request = SearchRequest::new(QUERY, "u1");
    request.project_id = Some("alpha".to_string());
    request.limit = 1;
    let outcome = h.engine.search(&request).await.unwrap();

    let ids: Vec<&str> = outcome.results.iter().map(|r| r.entry.id.as_str()).collect();
    assert_eq!(ids, vec!["unrelated"]);
    assert_eq!(outcome.stats.included, 1);
    assert_eq!(outcome.all_scored.len(), 2);
}

#[tokio::test]
async fn test_query_respects_token_budget() {
    let long_body = "x".repeat(2000);
    let items = [("a", 0.9), ("b", 0.8), ("c", 0.7)]
        .into_iter()
        .map(|(id, sim)| {
            let mut i = item(id, None, sim);
            i.body = long_body.clone();
            i
        })
        .collect();
    let h = harness(items).await;

    let mut query = RagQuery::new(QUERY, "u1");
    query.max_tokens = 700;
    let response = h.engine.query(&query, None).await.unwrap();

    assert_eq!(response.search_stats.included, 2);
    assert_eq!(response.sources.len(), 2);
    assert_eq!(response.sources[0].id, "a");
    assert!(response.context.len() <= 420 * 4);
    assert_eq!(response.compression_stats.original_context_size, 4000);
    assert_eq!(
        response.compression_stats.compressed_size,
        response.context.len()
    );
    assert!(response.answer.is_none());
}

#[tokio::test]
async fn test_query_without_matches_returns_empty_context() {
    let h = harness(vec![item("a", None, 0.1)]).await;
    let response = h.engine.query(&RagQuery::new(QUERY, "u1"), None).await.unwrap();
    assert!(response.context.is_empty());
    assert!(response.sources.is_empty());
    assert_eq!(response.compression_stats.compression_ratio, 0.0);
    assert!(!response.insights.suggestions.is_empty());
}

struct EchoGenerator;

#[async_trait]
impl recall::engine::AnswerGenerator for EchoGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        Ok(format!("{} / {} bytes", question, context.len()))
    }
}

#[tokio::test]
async fn test_generator_receives_context() {
    let h = harness(vec![item("a", None, 0.9)]).await;
    let response = h
        .engine
        .query(&RagQuery::new(QUERY, "u1"), Some(&EchoGenerator))
        .await
        .unwrap();
    let expected = format!("{} / {} bytes", QUERY, response.context.len());
    assert_eq!(response.answer.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_ingest_skips_trivial_and_failed_chunks() {
    let settings = EngineSettings {
        max_chunk_size: 80,
        ..EngineSettings::default()
    };
    let h = harness_with(Vec::new(), Vec::new(), MockProvider::new(), settings).await;

    // Prime the cache so ingestion has something to invalidate.
    let primed = h
        .engine
        .search(&SearchRequest::new("deployment runbook", "u1"))
        .await
        .unwrap();
    assert!(primed.results.is_empty());

    let body = "The release train leaves every second Tuesday from the main branch at noon.\n\n\
                Short.\n\n\
                FAIL this paragraph is long enough to embed, but the provider rejects it.\n\n\
                Rollbacks are handled by the on-call engineer using the documented runbook.";
    let mut content = NewContent::new("u1", ContentType::Knowledge, "Runbook", body);
    content.project_id = Some("alpha".to_string());
    let report = h.engine.ingest(content).await.unwrap();

    assert_eq!(report.chunks_total, 4);
    assert_eq!(report.chunks_skipped_trivial, 1);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.chunks_indexed, 2);

    let outcome = h
        .engine
        .search(&SearchRequest::new("deployment runbook", "u1"))
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(h.engine.cache().load_count(), 2);
    for result in &outcome.results {
        assert!(result.entry.title.starts_with("Runbook ["));
        assert!(result.entry.title.ends_with("/3]"));
        let chunk = result.entry.metadata.chunk.as_ref().unwrap();
        assert_eq!(chunk.parent_id, report.parent_id);
        assert_eq!(chunk.total, 3);
        assert!(result.entry.metadata.extra.contains_key("content_hash"));
    }
}

#[tokio::test]
async fn test_direct_search_is_project_scoped_and_bypasses_cache() {
    let mut old = item("old", Some("alpha"), 0.95);
    old.created_at = Utc::now() - ChronoDuration::days(90);
    let h = harness(vec![
        item("a1", Some("alpha"), 0.9),
        item("b1", Some("beta"), 0.95),
        old,
    ])
    .await;

    let mut request = SearchRequest::new(QUERY, "u1");
    request.project_id = Some("alpha".to_string());
    request.max_age_days = Some(30);
    let outcome = h.engine.search_direct(&request).await.unwrap();

    let ids: Vec<&str> = outcome.results.iter().map(|r| r.entry.id.as_str()).collect();
    assert_eq!(ids, vec!["a1"]);
    assert_eq!(h.repository.listings(), 0);
    assert_eq!(h.engine.cache().load_count(), 0);
}

#[tokio::test]
async fn test_insights_reflect_results() {
    let h = harness(vec![
        item("a", Some("alpha"), 0.9),
        item("b", Some("beta"), 0.85),
    ])
    .await;

    let mut request = SearchRequest::new(QUERY, "u1");
    request.project_id = Some("alpha".to_string());
    let outcome = h.engine.search(&request).await.unwrap();

    let insights = &outcome.insights;
    assert_eq!(insights.query, QUERY);
    assert_eq!(insights.quality.result_count, 2);
    assert!((insights.quality.project_coverage - 0.5).abs() < 1e-6);
    assert_eq!(insights.distribution.by_project.get("alpha"), Some(&1));
    assert_eq!(insights.distribution.by_project.get("beta"), Some(&1));
}
