//! Ingestion: chunk → embed → store → invalidate.
//!
//! A document is split with the paragraph/sentence chunker, trivial chunks
//! are dropped, and each remaining chunk is embedded and stored as its own
//! [`ContentItem`] carrying [`ChunkInfo`] metadata. Embedding or write
//! failures skip the affected chunk with a warning; they never abort the
//! batch. Re-ingesting the same document creates new chunk ids.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recall_core::chunk::{chunk_text, prepare_from_chunks, PreparedChunk};
use recall_core::models::{
    ChunkInfo, ContentDetails, ContentItem, ContentMetadata, ContentType,
};

use crate::engine::SearchEngine;
use crate::error::{RecallError, Result};

/// A document to ingest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewContent {
    pub owner_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub content_type: ContentType,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub details: ContentDetails,
    /// Defaults to the time of ingestion.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewContent {
    pub fn new(
        owner_id: impl Into<String>,
        content_type: ContentType,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            project_id: None,
            content_type,
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            details: ContentDetails::default(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub parent_id: String,
    /// Chunks produced by the chunker, trivial ones included.
    pub chunks_total: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped_trivial: usize,
    /// Chunks whose embedding or write failed.
    pub chunks_failed: usize,
}

fn chunk_title(title: &str, chunk: &PreparedChunk) -> String {
    if chunk.total > 1 {
        format!("{} [{}/{}]", title, chunk.index + 1, chunk.total)
    } else {
        title.to_string()
    }
}

impl SearchEngine {
    /// Chunk, embed and store `content`, then invalidate the owner's cache.
    pub async fn ingest(&self, content: NewContent) -> Result<IngestReport> {
        if content.owner_id.trim().is_empty() {
            return Err(RecallError::config("owner_id must not be empty"));
        }

        let parent_id = Uuid::new_v4().to_string();
        let created_at = content.created_at.unwrap_or_else(Utc::now);
        let settings = &self.settings;

        let chunks = chunk_text(&content.body, settings.max_chunk_size);
        let chunks_total = chunks.len();
        let prepared = prepare_from_chunks(&parent_id, chunks, settings.min_chunk_chars);
        let chunks_skipped_trivial = chunks_total.saturating_sub(prepared.len());

        let embedded: Vec<Option<(PreparedChunk, Vec<f32>)>> = stream::iter(prepared)
            .map(|chunk| async move {
                match self.embed_with_timeout(&chunk.text).await {
                    Ok(embedding) => Some((chunk, embedding)),
                    Err(e) => {
                        tracing::warn!(
                            parent_id = %chunk.parent_id,
                            index = chunk.index,
                            error = %e,
                            "embedding failed; skipping chunk"
                        );
                        None
                    }
                }
            })
            .buffer_unordered(settings.ingest_concurrency)
            .collect()
            .await;

        let mut chunks_indexed = 0usize;
        let mut chunks_failed = 0usize;
        for outcome in embedded {
            let Some((chunk, embedding)) = outcome else {
                chunks_failed += 1;
                continue;
            };

            let mut metadata = ContentMetadata::new(content.details.clone());
            metadata.chunk = Some(ChunkInfo {
                parent_id: parent_id.clone(),
                index: chunk.index,
                total: chunk.total,
                importance: chunk.importance,
            });
            metadata
                .extra
                .insert("content_hash".to_string(), chunk.hash.clone().into());

            let item = ContentItem {
                title: chunk_title(&content.title, &chunk),
                id: chunk.id,
                owner_id: content.owner_id.clone(),
                project_id: content.project_id.clone(),
                content_type: content.content_type,
                body: chunk.text,
                embedding,
                tags: content.tags.clone(),
                metadata,
                created_at,
            };

            match self.repository.insert(&item).await {
                Ok(()) => chunks_indexed += 1,
                Err(e) => {
                    tracing::warn!(id = %item.id, error = %e, "failed to store chunk; skipping");
                    chunks_failed += 1;
                }
            }
        }

        self.cache.invalidate(&content.owner_id);

        let report = IngestReport {
            parent_id,
            chunks_total,
            chunks_indexed,
            chunks_skipped_trivial,
            chunks_failed,
        };
        tracing::info!(
            parent_id = %report.parent_id,
            owner_id = %content.owner_id,
            indexed = report.chunks_indexed,
            trivial = report.chunks_skipped_trivial,
            failed = report.chunks_failed,
            "ingested document"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_content_from_json() {
        let c: NewContent = serde_json::from_str(
            r#"{
                "owner_id": "u1",
                "content_type": "document",
                "title": "Notes",
                "body": "Hello",
                "details": { "kind": "knowledge", "source_path": "notes.md" }
            }"#,
        )
        .unwrap();
        assert_eq!(c.content_type, ContentType::Knowledge);
        assert!(c.created_at.is_none());
    }
}
