//! Content repository and relationship store abstractions.
//!
//! The engine never owns content: it reads it through a
//! [`ContentRepository`] and reads project edges through a
//! [`RelationshipStore`]. Both are async traits so a backend may sit
//! behind a network hop; the bundled backends are in-memory (tests and
//! embedding the engine in another process) and SQLite.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`list_eligible_ids`](ContentRepository::list_eligible_ids) | Ids worth caching for an owner, newest first, capped |
//! | [`fetch`](ContentRepository::fetch) | One stored item, still compressed |
//! | [`list_by_filters`](ContentRepository::list_by_filters) | Decoded items matching a query, bypassing the cache |
//! | [`insert`](ContentRepository::insert) | Store one item |
//! | [`get_outgoing`](RelationshipStore::get_outgoing) | Edges leaving a project |
//! | [`get_relationship`](RelationshipStore::get_relationship) | One edge, if present |
//! | [`upsert`](RelationshipStore::upsert) | Create or replace an edge |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use recall_core::models::{
    CacheEntry, ContentItem, ContentMetadata, ContentType, ProjectRelationship,
};

use crate::codec::{blob_to_vec, compress_content, decompress_content, vec_to_blob};
use crate::error::{RecallError, Result};

pub use memory::{InMemoryRelationshipStore, InMemoryRepository};
pub use sqlite::{SqliteRelationshipStore, SqliteRepository};

/// An item as a repository holds it: body compressed, vector as a blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredContent {
    pub id: String,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub content_type: ContentType,
    pub title: String,
    pub tags: Vec<String>,
    pub metadata: ContentMetadata,
    pub created_at: DateTime<Utc>,
    pub embedding_blob: Vec<u8>,
    pub compressed_content: Vec<u8>,
}

impl StoredContent {
    /// Encode an item for storage.
    pub fn encode(item: &ContentItem) -> Result<Self> {
        Ok(Self {
            id: item.id.clone(),
            owner_id: item.owner_id.clone(),
            project_id: item.project_id.clone(),
            content_type: item.content_type,
            title: item.title.clone(),
            tags: item.tags.clone(),
            metadata: item.metadata.clone(),
            created_at: item.created_at,
            embedding_blob: vec_to_blob(&item.embedding),
            compressed_content: compress_content(&item.body)?,
        })
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding_blob.is_empty()
    }

    /// Decompress into a full [`ContentItem`].
    pub fn decode(self) -> Result<ContentItem> {
        let body = decompress_content(&self.compressed_content)?;
        Ok(ContentItem {
            embedding: blob_to_vec(&self.embedding_blob),
            id: self.id,
            owner_id: self.owner_id,
            project_id: self.project_id,
            content_type: self.content_type,
            title: self.title,
            body,
            tags: self.tags,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }

    /// Decompress straight into the cache projection.
    pub fn into_cache_entry(self) -> Result<CacheEntry> {
        self.decode().map(CacheEntry::from)
    }
}

/// Filters for [`ContentRepository::list_by_filters`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentQuery {
    pub project_id: Option<String>,
    pub content_types: Option<Vec<ContentType>>,
    pub created_after: Option<DateTime<Utc>>,
    /// Only items that carry an embedding.
    pub embedded_only: bool,
}

impl ContentQuery {
    fn matches(&self, item: &StoredContent) -> bool {
        if let Some(project) = &self.project_id {
            if item.project_id.as_ref() != Some(project) {
                return false;
            }
        }
        if let Some(types) = &self.content_types {
            if !types.contains(&item.content_type) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if item.created_at < after {
                return false;
            }
        }
        !self.embedded_only || item.has_embedding()
    }
}

/// Source of indexed content.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Ids of the owner's embedded items, ordered by `created_at` desc then
    /// id asc, at most `cap` of them.
    async fn list_eligible_ids(&self, owner_id: &str, cap: usize) -> Result<Vec<String>>;

    /// Fetch one item by id. `Ok(None)` when it no longer exists.
    async fn fetch(&self, id: &str) -> Result<Option<StoredContent>>;

    /// Decoded items of `owner_id` matching `query`, newest first.
    async fn list_by_filters(&self, owner_id: &str, query: &ContentQuery)
        -> Result<Vec<ContentItem>>;

    /// Insert a new item. Fails if the id already exists.
    async fn insert(&self, item: &ContentItem) -> Result<()>;
}

/// Source of project-to-project edges.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn get_outgoing(&self, project_id: &str) -> Result<Vec<ProjectRelationship>>;

    async fn get_relationship(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<ProjectRelationship>>;

    /// Create or replace the edge `source_id → target_id`.
    async fn upsert(&self, relationship: &ProjectRelationship) -> Result<()>;
}

/// Reject edges the relevance model cannot use.
pub fn validate_relationship(relationship: &ProjectRelationship) -> Result<()> {
    if relationship.source_id.is_empty() || relationship.target_id.is_empty() {
        return Err(RecallError::config("relationship endpoints must be non-empty"));
    }
    if relationship.source_id == relationship.target_id {
        return Err(RecallError::config("a project cannot relate to itself"));
    }
    if !(0.0..=1.0).contains(&relationship.confidence) {
        return Err(RecallError::config(format!(
            "relationship confidence must be in [0, 1], got {}",
            relationship.confidence
        )));
    }
    Ok(())
}
