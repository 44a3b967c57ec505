//! Time-bounded vector cache.
//!
//! Holds decompressed [`CacheEntry`] projections per owner so a search
//! never touches the repository for candidates that are already known.
//!
//! # State machine
//!
//! ```text
//! Empty ──ensure_fresh──▶ Loading ──▶ Fresh ──ttl elapses / invalidate──▶ Stale
//!                            ▲                                             │
//!                            └──────────────ensure_fresh───────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Atomic swap.** A repopulation builds a complete [`CacheSnapshot`]
//!   off to the side and replaces the previous one under a short write
//!   lock. Readers hold an `Arc` to whichever snapshot was current when
//!   they asked, so they never see a half-built one.
//! - **Single flight.** Each owner slot has an async load guard.
//!   [`VectorCache::ensure_fresh`] checks freshness, takes the guard,
//!   checks again, and only then loads. Callers racing a stale boundary
//!   queue on the guard and all receive the one new snapshot.
//! - **Per-item isolation.** A fetch that fails, times out, or yields an
//!   undecodable body is logged and skipped. Only a failure of the id
//!   listing itself fails the load, leaving the previous snapshot in place.
//!
//! Freshness uses [`tokio::time::Instant`], so tests can drive the TTL
//! with a paused clock.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use recall_core::embedding::has_expected_dims;
use recall_core::models::CacheEntry;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::repository::ContentRepository;

/// Runtime knobs for [`VectorCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub ttl: Duration,
    /// Cap passed to `list_eligible_ids`.
    pub max_entries: usize,
    pub fetch_concurrency: usize,
    pub fetch_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_entries: config.max_entries,
            fetch_concurrency: config.fetch_concurrency.max(1),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// An immutable, fully-populated view of one owner's cached entries.
#[derive(Debug)]
pub struct CacheSnapshot {
    entries: Vec<Arc<CacheEntry>>,
    index: HashMap<String, usize>,
    loaded_at: Instant,
    generation: u64,
}

impl CacheSnapshot {
    fn new(entries: Vec<Arc<CacheEntry>>, generation: u64) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        Self {
            entries,
            index,
            loaded_at: Instant::now(),
            generation,
        }
    }

    /// Entries in repository order (newest first).
    pub fn entries(&self) -> &[Arc<CacheEntry>] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<Arc<CacheEntry>> {
        self.index.get(id).map(|&i| Arc::clone(&self.entries[i]))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }
}

#[derive(Default)]
struct Slot {
    current: RwLock<Option<Arc<CacheSnapshot>>>,
    /// Bumped by `invalidate`; a snapshot from an older generation is stale.
    generation: AtomicU64,
    load_guard: tokio::sync::Mutex<()>,
}

impl Slot {
    fn current(&self) -> Option<Arc<CacheSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, snapshot: Arc<CacheSnapshot>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot);
    }
}

/// Per-owner cache of decompressed entries, populated lazily from a
/// [`ContentRepository`].
pub struct VectorCache {
    repository: Arc<dyn ContentRepository>,
    settings: CacheSettings,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    loads: AtomicU64,
}

impl VectorCache {
    pub fn new(repository: Arc<dyn ContentRepository>, settings: CacheSettings) -> Self {
        Self {
            repository,
            settings,
            slots: Mutex::new(HashMap::new()),
            loads: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn slot(&self, owner_id: &str) -> Arc<Slot> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(slots.entry(owner_id.to_string()).or_default())
    }

    fn existing_slot(&self, owner_id: &str) -> Option<Arc<Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(owner_id)
            .cloned()
    }

    fn fresh_snapshot(&self, slot: &Slot) -> Option<Arc<CacheSnapshot>> {
        let snapshot = slot.current()?;
        let fresh = snapshot.generation == slot.generation.load(Ordering::Acquire)
            && snapshot.loaded_at.elapsed() < self.settings.ttl;
        fresh.then_some(snapshot)
    }

    /// Return a fresh snapshot for `owner_id`, repopulating first if the
    /// current one is missing, expired, or invalidated.
    pub async fn ensure_fresh(&self, owner_id: &str) -> Result<Arc<CacheSnapshot>> {
        let slot = self.slot(owner_id);
        if let Some(snapshot) = self.fresh_snapshot(&slot) {
            return Ok(snapshot);
        }

        let _guard = slot.load_guard.lock().await;
        // Another caller may have finished a load while we waited.
        if let Some(snapshot) = self.fresh_snapshot(&slot) {
            return Ok(snapshot);
        }

        let generation = slot.generation.load(Ordering::Acquire);
        let started = Instant::now();
        let snapshot = Arc::new(self.load(owner_id, generation).await?);
        slot.replace(Arc::clone(&snapshot));
        self.loads.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            owner_id,
            entries = snapshot.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "vector cache repopulated"
        );
        Ok(snapshot)
    }

    async fn load(&self, owner_id: &str, generation: u64) -> Result<CacheSnapshot> {
        let ids = self
            .repository
            .list_eligible_ids(owner_id, self.settings.max_entries)
            .await?;

        let mut fetched: Vec<(usize, CacheEntry)> = stream::iter(ids.into_iter().enumerate())
            .map(|(position, id)| async move {
                self.fetch_entry(owner_id, &id)
                    .await
                    .map(|entry| (position, entry))
            })
            .buffer_unordered(self.settings.fetch_concurrency)
            .filter_map(|fetched| async move { fetched })
            .collect()
            .await;

        fetched.sort_by_key(|(position, _)| *position);
        let entries = fetched
            .into_iter()
            .map(|(_, entry)| Arc::new(entry))
            .collect();
        Ok(CacheSnapshot::new(entries, generation))
    }

    async fn fetch_entry(&self, owner_id: &str, id: &str) -> Option<CacheEntry> {
        let stored =
            match tokio::time::timeout(self.settings.fetch_timeout, self.repository.fetch(id))
                .await
            {
                Ok(Ok(Some(stored))) => stored,
                Ok(Ok(None)) => {
                    tracing::warn!(id, "content item disappeared before it could be cached; skipping");
                    return None;
                }
                Ok(Err(e)) => {
                    tracing::warn!(id, error = %e, "failed to fetch content item; skipping");
                    return None;
                }
                Err(_) => {
                    tracing::warn!(
                        id,
                        timeout_ms = self.settings.fetch_timeout.as_millis() as u64,
                        "content fetch timed out; skipping"
                    );
                    return None;
                }
            };

        if stored.owner_id != owner_id {
            tracing::warn!(id, "content item belongs to another owner; skipping");
            return None;
        }

        match stored.into_cache_entry() {
            Ok(entry) => {
                if !has_expected_dims(&entry.embedding) {
                    tracing::warn!(
                        id,
                        dims = entry.embedding.len(),
                        "embedding has unexpected dimensionality; it will score 0"
                    );
                }
                Some(entry)
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to decode content item; skipping");
                None
            }
        }
    }

    /// Current snapshot without refreshing, if one has been loaded.
    pub fn snapshot(&self, owner_id: &str) -> Option<Arc<CacheSnapshot>> {
        self.existing_slot(owner_id)?.current()
    }

    pub fn get(&self, owner_id: &str, id: &str) -> Option<Arc<CacheEntry>> {
        self.snapshot(owner_id)?.get(id)
    }

    pub fn all(&self, owner_id: &str) -> Vec<Arc<CacheEntry>> {
        self.snapshot(owner_id)
            .map(|s| s.entries().to_vec())
            .unwrap_or_default()
    }

    /// Mark the owner's snapshot stale; the next `ensure_fresh` reloads.
    pub fn invalidate(&self, owner_id: &str) {
        if let Some(slot) = self.existing_slot(owner_id) {
            slot.generation.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(owner_id, "vector cache invalidated");
        }
    }

    /// Number of completed repopulations across all owners.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}
