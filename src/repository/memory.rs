//! In-memory repository and relationship store.
//!
//! Uses `HashMap` behind `std::sync::RwLock`. Items are held encoded, the
//! same way a persistent backend holds them, so the cache's decode path is
//! exercised identically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use recall_core::models::{ContentItem, ProjectRelationship};

use super::{
    validate_relationship, ContentQuery, ContentRepository, RelationshipStore, StoredContent,
};
use crate::error::{RecallError, Result};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| RecallError::Repository("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| RecallError::Repository("in-memory store lock poisoned".to_string()))
}

/// In-memory content repository.
#[derive(Default)]
pub struct InMemoryRepository {
    items: RwLock<HashMap<String, StoredContent>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove an item; returns whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        Ok(write(&self.items)?.remove(id).is_some())
    }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn list_eligible_ids(&self, owner_id: &str, cap: usize) -> Result<Vec<String>> {
        let items = read(&self.items)?;
        let mut eligible: Vec<&StoredContent> = items
            .values()
            .filter(|i| i.owner_id == owner_id && i.has_embedding())
            .collect();
        eligible.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(eligible.into_iter().take(cap).map(|i| i.id.clone()).collect())
    }

    async fn fetch(&self, id: &str) -> Result<Option<StoredContent>> {
        Ok(read(&self.items)?.get(id).cloned())
    }

    async fn list_by_filters(
        &self,
        owner_id: &str,
        query: &ContentQuery,
    ) -> Result<Vec<ContentItem>> {
        let mut matching: Vec<StoredContent> = read(&self.items)?
            .values()
            .filter(|i| i.owner_id == owner_id && query.matches(i))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matching
            .into_iter()
            .filter_map(|stored| {
                let id = stored.id.clone();
                match stored.decode() {
                    Ok(item) => Some(item),
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, "failed to decode content item; skipping");
                        None
                    }
                }
            })
            .collect())
    }

    async fn insert(&self, item: &ContentItem) -> Result<()> {
        let stored = StoredContent::encode(item)?;
        let mut items = write(&self.items)?;
        if items.contains_key(&item.id) {
            return Err(RecallError::Repository(format!(
                "content item {} already exists",
                item.id
            )));
        }
        items.insert(item.id.clone(), stored);
        Ok(())
    }
}

/// In-memory relationship store keyed by `(source, target)`.
#[derive(Default)]
pub struct InMemoryRelationshipStore {
    edges: RwLock<HashMap<(String, String), ProjectRelationship>>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `relationships`.
    pub fn with_relationships(relationships: Vec<ProjectRelationship>) -> Result<Self> {
        let store = Self::new();
        {
            let mut edges = write(&store.edges)?;
            for r in relationships {
                validate_relationship(&r)?;
                edges.insert((r.source_id.clone(), r.target_id.clone()), r);
            }
        }
        Ok(store)
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn get_outgoing(&self, project_id: &str) -> Result<Vec<ProjectRelationship>> {
        let mut out: Vec<ProjectRelationship> = read(&self.edges)?
            .values()
            .filter(|r| r.source_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        Ok(out)
    }

    async fn get_relationship(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<ProjectRelationship>> {
        Ok(read(&self.edges)?
            .get(&(source_id.to_string(), target_id.to_string()))
            .cloned())
    }

    async fn upsert(&self, relationship: &ProjectRelationship) -> Result<()> {
        validate_relationship(relationship)?;
        write(&self.edges)?.insert(
            (
                relationship.source_id.clone(),
                relationship.target_id.clone(),
            ),
            relationship.clone(),
        );
        Ok(())
    }
}
