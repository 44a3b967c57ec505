//! SQLite backend tests against a temporary database file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

use recall::config::Config;
use recall::db;
use recall::embedding::EmbeddingProvider;
use recall::engine::{EngineSettings, SearchEngine, SearchRequest};
use recall::error::{RecallError, Result};
use recall::ingest::NewContent;
use recall::migrate::run_migrations;
use recall::repository::{
    ContentQuery, ContentRepository, RelationshipStore, SqliteRelationshipStore,
    SqliteRepository,
};
use recall_core::models::{
    ContentDetails, ContentItem, ContentMetadata, ContentType, ProjectRelationship,
    EMBEDDING_DIMS,
};

async fn setup() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.repository.path = dir.path().join("data").join("recall.sqlite");
    let pool = db::connect(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    (dir, pool)
}

fn at_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
}

fn item(id: &str, owner: &str, project: Option<&str>, created_ms: i64) -> ContentItem {
    let mut embedding = vec![0.0; EMBEDDING_DIMS];
    embedding[0] = 0.25;
    embedding[EMBEDDING_DIMS - 1] = -1.5;
    ContentItem {
        id: id.to_string(),
        owner_id: owner.to_string(),
        project_id: project.map(str::to_string),
        content_type: ContentType::Email,
        title: format!("Subject {}", id),
        body: format!("Body of {} with unicode: café ✓", id),
        embedding,
        tags: vec!["inbox".to_string()],
        metadata: ContentMetadata::new(ContentDetails::Email {
            from: "ana@example.com".to_string(),
            subject: format!("Subject {}", id),
            thread_id: None,
        }),
        created_at: at_millis(created_ms),
    }
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_dir, pool) = setup().await;
    run_migrations(&pool).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert!(tables.contains(&"content_items".to_string()));
    assert!(tables.contains(&"project_relationships".to_string()));
}

#[tokio::test]
async fn test_insert_then_fetch_round_trips() {
    let (_dir, pool) = setup().await;
    let repo = SqliteRepository::new(pool);
    let original = item("a", "u1", Some("alpha"), 1_700_000_000_123);
    repo.insert(&original).await.unwrap();

    let stored = repo.fetch("a").await.unwrap().unwrap();
    assert!(stored.has_embedding());
    assert_ne!(stored.compressed_content, original.body.as_bytes());
    assert_eq!(stored.decode().unwrap(), original);

    assert!(repo.fetch("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_id_is_rejected() {
    let (_dir, pool) = setup().await;
    let repo = SqliteRepository::new(pool);
    repo.insert(&item("a", "u1", None, 1)).await.unwrap();
    let err = repo.insert(&item("a", "u1", None, 2)).await.unwrap_err();
    assert!(matches!(err, RecallError::Repository(_)));
}

#[tokio::test]
async fn test_eligible_ids_newest_first_owner_scoped_and_capped() {
    let (_dir, pool) = setup().await;
    let repo = SqliteRepository::new(pool);
    repo.insert(&item("old", "u1", None, 1_000)).await.unwrap();
    repo.insert(&item("new", "u1", None, 3_000)).await.unwrap();
    repo.insert(&item("tie-b", "u1", None, 2_000)).await.unwrap();
    repo.insert(&item("tie-a", "u1", None, 2_000)).await.unwrap();
    repo.insert(&item("other", "u2", None, 9_000)).await.unwrap();

    let mut unembedded = item("bare", "u1", None, 8_000);
    unembedded.embedding.clear();
    repo.insert(&unembedded).await.unwrap();

    let ids = repo.list_eligible_ids("u1", 10).await.unwrap();
    assert_eq!(ids, vec!["new", "tie-a", "tie-b", "old"]);

    let capped = repo.list_eligible_ids("u1", 2).await.unwrap();
    assert_eq!(capped, vec!["new", "tie-a"]);
}

#[tokio::test]
async fn test_list_by_filters() {
    let (_dir, pool) = setup().await;
    let repo = SqliteRepository::new(pool);
    repo.insert(&item("a1", "u1", Some("alpha"), 5_000)).await.unwrap();
    repo.insert(&item("a2", "u1", Some("alpha"), 1_000)).await.unwrap();
    repo.insert(&item("b1", "u1", Some("beta"), 5_000)).await.unwrap();
    let mut note = item("a3", "u1", Some("alpha"), 6_000);
    note.content_type = ContentType::Knowledge;
    repo.insert(&note).await.unwrap();

    let query = ContentQuery {
        project_id: Some("alpha".to_string()),
        content_types: Some(vec![ContentType::Email]),
        created_after: Some(at_millis(2_000)),
        embedded_only: true,
    };
    let items = repo.list_by_filters("u1", &query).await.unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a1"]);
    assert_eq!(items[0].body, "Body of a1 with unicode: café ✓");

    let all = repo
        .list_by_filters("u1", &ContentQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    assert!(repo
        .list_by_filters("u2", &ContentQuery::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_relationship_upsert_and_lookup() {
    let (_dir, pool) = setup().await;
    let store = SqliteRelationshipStore::new(pool);
    let edge = |target: &str, kind: &str, confidence: f32| ProjectRelationship {
        source_id: "alpha".to_string(),
        target_id: target.to_string(),
        relationship_type: kind.to_string(),
        confidence,
    };

    store.upsert(&edge("beta", "related", 0.4)).await.unwrap();
    store.upsert(&edge("gamma", "depends_on", 0.9)).await.unwrap();
    store.upsert(&edge("beta", "parent", 0.75)).await.unwrap();

    let outgoing = store.get_outgoing("alpha").await.unwrap();
    assert_eq!(outgoing.len(), 2);
    assert_eq!(outgoing[0].target_id, "beta");
    assert_eq!(outgoing[0].relationship_type, "parent");
    assert!((outgoing[0].confidence - 0.75).abs() < 1e-6);

    assert!(store.get_relationship("beta", "alpha").await.unwrap().is_none());
    assert!(store.get_outgoing("beta").await.unwrap().is_empty());

    let err = store.upsert(&edge("alpha", "self", 0.5)).await.unwrap_err();
    assert!(matches!(err, RecallError::Configuration(_)));
    let err = store.upsert(&edge("delta", "related", 1.5)).await.unwrap_err();
    assert!(matches!(err, RecallError::Configuration(_)));
}

/// Every text embeds to the same unit vector.
struct ConstantProvider;

#[async_trait]
impl EmbeddingProvider for ConstantProvider {
    fn model_name(&self) -> &str {
        "constant"
    }

    fn dims(&self) -> usize {
        EMBEDDING_DIMS
    }

    async fn embed(&self, _text: &str, _max_input_chars: usize) -> Result<Vec<f32>> {
        let mut v = vec![0.0; EMBEDDING_DIMS];
        v[7] = 1.0;
        Ok(v)
    }
}

#[tokio::test]
async fn test_ingest_and_search_over_sqlite() {
    let (_dir, pool) = setup().await;
    let engine = SearchEngine::new(
        Arc::new(ConstantProvider),
        Arc::new(SqliteRepository::new(pool.clone())),
        Arc::new(SqliteRelationshipStore::new(pool)),
        EngineSettings::default(),
    );

    let mut content = NewContent::new(
        "u1",
        ContentType::Knowledge,
        "Onboarding",
        "New engineers pair with a buddy for their first two weeks on the team.",
    );
    content.project_id = Some("alpha".to_string());
    let report = engine.ingest(content).await.unwrap();
    assert_eq!(report.chunks_indexed, 1);

    let mut request = SearchRequest::new("how does onboarding work?", "u1");
    request.project_id = Some("alpha".to_string());
    let outcome = engine.search(&request).await.unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].entry.title, "Onboarding");
    assert!((outcome.results[0].similarity - 1.0).abs() < 1e-5);

    let direct = engine.search_direct(&request).await.unwrap();
    assert_eq!(direct.results.len(), 1);
    assert_eq!(direct.results[0].entry.id, outcome.results[0].entry.id);
}

#[tokio::test]
async fn test_corrupt_row_is_skipped_by_both_search_paths() {
    let (_dir, pool) = setup().await;
    let repo = Arc::new(SqliteRepository::new(pool.clone()));
    let mut axis7 = vec![0.0; EMBEDDING_DIMS];
    axis7[7] = 1.0;
    for (id, created_ms) in [("good", 1_000), ("bad", 2_000)] {
        let mut i = item(id, "u1", Some("alpha"), created_ms);
        i.embedding = axis7.clone();
        repo.insert(&i).await.unwrap();
    }
    sqlx::query("UPDATE content_items SET content = ? WHERE id = ?")
        .bind(b"not gzip".to_vec())
        .bind("bad")
        .execute(&pool)
        .await
        .unwrap();

    let listed = repo
        .list_by_filters(
            "u1",
            &ContentQuery {
                project_id: Some("alpha".to_string()),
                ..ContentQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "good");

    let engine = SearchEngine::new(
        Arc::new(ConstantProvider),
        repo,
        Arc::new(SqliteRelationshipStore::new(pool)),
        EngineSettings::default(),
    );
    let mut request = SearchRequest::new("anything", "u1");
    request.project_id = Some("alpha".to_string());

    let cached = engine.search(&request).await.unwrap();
    assert_eq!(cached.results.len(), 1);
    assert_eq!(cached.results[0].entry.id, "good");

    let direct = engine.search_direct(&request).await.unwrap();
    assert_eq!(direct.results.len(), 1);
    assert_eq!(direct.results[0].entry.id, "good");
}
