//! SQLite-backed repository and relationship store.
//!
//! Schema is created by [`crate::migrate::run_migrations`]. Timestamps are
//! stored as unix milliseconds, vectors as little-endian `f32` blobs, and
//! bodies gzip-compressed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use recall_core::models::{ContentItem, ContentType, ProjectRelationship};

use super::{
    validate_relationship, ContentQuery, ContentRepository, RelationshipStore, StoredContent,
};
use crate::error::{RecallError, Result};

const CONTENT_COLUMNS: &str = "id, owner_id, project_id, content_type, title, tags_json, \
     metadata_json, created_at, embedding, content";

/// SQLite implementation of [`ContentRepository`].
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn data_error(what: &str, e: impl std::fmt::Display) -> RecallError {
    RecallError::Repository(format!("invalid {} in content_items: {}", what, e))
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredContent> {
    let content_type: String = row.try_get("content_type")?;
    let content_type: ContentType = content_type
        .parse()
        .map_err(|e| data_error("content_type", e))?;

    let tags_json: String = row.try_get("tags_json")?;
    let tags = serde_json::from_str(&tags_json).map_err(|e| data_error("tags_json", e))?;

    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata =
        serde_json::from_str(&metadata_json).map_err(|e| data_error("metadata_json", e))?;

    let created_ms: i64 = row.try_get("created_at")?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms)
        .ok_or_else(|| data_error("created_at", created_ms))?;

    Ok(StoredContent {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        project_id: row.try_get("project_id")?,
        content_type,
        title: row.try_get("title")?,
        tags,
        metadata,
        created_at,
        embedding_blob: row.try_get("embedding")?,
        compressed_content: row.try_get("content")?,
    })
}

#[async_trait]
impl ContentRepository for SqliteRepository {
    async fn list_eligible_ids(&self, owner_id: &str, cap: usize) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM content_items
            WHERE owner_id = ? AND length(embedding) > 0
            ORDER BY created_at DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(cap as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn fetch(&self, id: &str) -> Result<Option<StoredContent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_items WHERE id = ?",
            CONTENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_stored).transpose()
    }

    async fn list_by_filters(
        &self,
        owner_id: &str,
        query: &ContentQuery,
    ) -> Result<Vec<ContentItem>> {
        let created_after = query.created_after.map(|t| t.timestamp_millis());
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM content_items
            WHERE owner_id = ?
              AND (? IS NULL OR project_id = ?)
              AND (? IS NULL OR created_at >= ?)
            ORDER BY created_at DESC, id ASC
            "#,
            CONTENT_COLUMNS
        ))
        .bind(owner_id)
        .bind(&query.project_id)
        .bind(&query.project_id)
        .bind(created_after)
        .bind(created_after)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let stored = match row_to_stored(row) {
                Ok(stored) => stored,
                Err(e) => {
                    let id: Option<String> = row.try_get("id").ok();
                    tracing::warn!(id = ?id, error = %e, "failed to read content row; skipping");
                    continue;
                }
            };
            // Type and embedding filters stay in Rust, like the in-memory store.
            if !query.matches(&stored) {
                continue;
            }
            let id = stored.id.clone();
            match stored.decode() {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "failed to decode content item; skipping");
                }
            }
        }
        Ok(items)
    }

    async fn insert(&self, item: &ContentItem) -> Result<()> {
        let stored = StoredContent::encode(item)?;
        let tags_json = serde_json::to_string(&stored.tags)
            .map_err(|e| RecallError::Repository(e.to_string()))?;
        let metadata_json = serde_json::to_string(&stored.metadata)
            .map_err(|e| RecallError::Repository(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO content_items (id, owner_id, project_id, content_type, title,
                                       tags_json, metadata_json, created_at, embedding, content)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.owner_id)
        .bind(&stored.project_id)
        .bind(stored.content_type.as_str())
        .bind(&stored.title)
        .bind(&tags_json)
        .bind(&metadata_json)
        .bind(stored.created_at.timestamp_millis())
        .bind(&stored.embedding_blob)
        .bind(&stored.compressed_content)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// SQLite implementation of [`RelationshipStore`].
pub struct SqliteRelationshipStore {
    pool: SqlitePool,
}

impl SqliteRelationshipStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_relationship(row: &SqliteRow) -> Result<ProjectRelationship> {
    let confidence: f64 = row.try_get("confidence")?;
    Ok(ProjectRelationship {
        source_id: row.try_get("source_id")?,
        target_id: row.try_get("target_id")?,
        relationship_type: row.try_get("relationship_type")?,
        confidence: confidence as f32,
    })
}

#[async_trait]
impl RelationshipStore for SqliteRelationshipStore {
    async fn get_outgoing(&self, project_id: &str) -> Result<Vec<ProjectRelationship>> {
        let rows = sqlx::query(
            r#"
            SELECT source_id, target_id, relationship_type, confidence
            FROM project_relationships
            WHERE source_id = ?
            ORDER BY target_id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_relationship).collect()
    }

    async fn get_relationship(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<ProjectRelationship>> {
        let row = sqlx::query(
            r#"
            SELECT source_id, target_id, relationship_type, confidence
            FROM project_relationships
            WHERE source_id = ? AND target_id = ?
            "#,
        )
        .bind(source_id)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_relationship).transpose()
    }

    async fn upsert(&self, relationship: &ProjectRelationship) -> Result<()> {
        validate_relationship(relationship)?;
        sqlx::query(
            r#"
            INSERT INTO project_relationships (source_id, target_id, relationship_type, confidence, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id) DO UPDATE SET
                relationship_type = excluded.relationship_type,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&relationship.source_id)
        .bind(&relationship.target_id)
        .bind(&relationship.relationship_type)
        .bind(relationship.confidence as f64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
