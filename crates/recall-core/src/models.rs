//! Core data models used throughout Recall.
//!
//! These types represent the content items, cache projections, project
//! relationships, and search results that flow through the retrieval
//! pipeline. The content repository owns [`ContentItem`]s; this crate only
//! reads them and attaches derived scores at query time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Dimensionality of every embedding vector in the system.
pub const EMBEDDING_DIMS: usize = 1536;

/// Closed set of content kinds the repository indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Conversation,
    #[serde(alias = "document")]
    Knowledge,
    Email,
    File,
    Calendar,
    Transcript,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Conversation,
        ContentType::Knowledge,
        ContentType::Email,
        ContentType::File,
        ContentType::Calendar,
        ContentType::Transcript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Conversation => "conversation",
            ContentType::Knowledge => "knowledge",
            ContentType::Email => "email",
            ContentType::File => "file",
            ContentType::Calendar => "calendar",
            ContentType::Transcript => "transcript",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conversation" => Ok(ContentType::Conversation),
            "knowledge" | "document" => Ok(ContentType::Knowledge),
            "email" => Ok(ContentType::Email),
            "file" => Ok(ContentType::File),
            "calendar" => Ok(ContentType::Calendar),
            "transcript" => Ok(ContentType::Transcript),
            other => anyhow::bail!(
                "Unknown content type: '{}'. Use conversation, knowledge, email, file, calendar, or transcript.",
                other
            ),
        }
    }
}

/// Type-specific metadata, one variant per content kind.
///
/// Producers that know the shape of their content fill the matching
/// variant; anything genuinely unstructured goes into
/// [`ContentMetadata::extra`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentDetails {
    Conversation {
        #[serde(default)]
        participants: Vec<String>,
        #[serde(default)]
        message_count: u32,
    },
    Knowledge {
        #[serde(default)]
        source_path: Option<String>,
    },
    Email {
        from: String,
        subject: String,
        #[serde(default)]
        thread_id: Option<String>,
    },
    File {
        file_name: String,
        #[serde(default)]
        mime_type: Option<String>,
        #[serde(default)]
        size_bytes: Option<u64>,
    },
    Calendar {
        starts_at: DateTime<Utc>,
        #[serde(default)]
        ends_at: Option<DateTime<Utc>>,
        #[serde(default)]
        attendees: Vec<String>,
    },
    Transcript {
        #[serde(default)]
        speakers: Vec<String>,
        #[serde(default)]
        duration_secs: Option<u64>,
    },
    #[default]
    Unstructured,
}

/// Position of an ingested chunk within its parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub parent_id: String,
    pub index: u32,
    pub total: u32,
    /// Declines with position; the lead chunk is `1.0`.
    pub importance: f32,
}

/// Metadata attached to a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContentMetadata {
    #[serde(default)]
    pub details: ContentDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkInfo>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentMetadata {
    pub fn new(details: ContentDetails) -> Self {
        Self {
            details,
            chunk: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A unit of indexed knowledge, as held by the content repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub content_type: ContentType,
    pub title: String,
    pub body: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: ContentMetadata,
    pub created_at: DateTime<Utc>,
}

/// Decompressed projection of a [`ContentItem`] held by the vector cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub id: String,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub content_type: ContentType,
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub tags: Vec<String>,
    pub metadata: ContentMetadata,
    pub created_at: DateTime<Utc>,
}

impl From<ContentItem> for CacheEntry {
    fn from(item: ContentItem) -> Self {
        Self {
            id: item.id,
            owner_id: item.owner_id,
            project_id: item.project_id,
            content_type: item.content_type,
            title: item.title,
            content: item.body,
            embedding: item.embedding,
            tags: item.tags,
            metadata: item.metadata,
            created_at: item.created_at,
        }
    }
}

/// Directed, confidence-weighted edge between two projects.
///
/// Maintained by the external project system; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    /// In `[0.0, 1.0]`.
    pub confidence: f32,
}

/// How a result's project relates to the requesting project.
///
/// Absence (`None` on [`SearchResult::project_context`]) means the result
/// has no project or belongs to an unrelated one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectContext {
    DirectMatch,
    Related {
        relationship_type: String,
        confidence: f32,
    },
}

impl ProjectContext {
    pub fn is_direct_match(&self) -> bool {
        matches!(self, ProjectContext::DirectMatch)
    }

    pub fn is_related_project(&self) -> bool {
        matches!(self, ProjectContext::Related { .. })
    }
}

/// Filters for a single similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub owner_id: String,
    #[serde(default)]
    pub content_types: Option<Vec<ContentType>>,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    pub similarity_threshold: f32,
    pub limit: usize,
}

/// A scored candidate produced by the search pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(rename = "item", serialize_with = "serialize_entry_summary")]
    pub entry: Arc<CacheEntry>,
    /// Raw cosine similarity.
    pub similarity: f32,
    /// Similarity after the direct-match boost; equals `similarity` otherwise.
    pub weighted_similarity: f32,
    pub project_relevance: f32,
    pub final_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_context: Option<ProjectContext>,
    pub preview: String,
}

impl SearchResult {
    /// Wrap a cache entry with its raw similarity; relevance fields start neutral.
    pub fn new(entry: Arc<CacheEntry>, similarity: f32) -> Self {
        let preview = make_preview(&entry.content, PREVIEW_CHARS);
        Self {
            entry,
            similarity,
            weighted_similarity: similarity,
            project_relevance: 0.5,
            final_score: similarity,
            project_context: None,
            preview,
        }
    }
}

#[derive(Serialize)]
struct EntrySummary<'a> {
    id: &'a str,
    title: &'a str,
    content_type: ContentType,
    project_id: Option<&'a str>,
    tags: &'a [String],
    created_at: String,
}

fn serialize_entry_summary<S: Serializer>(
    entry: &Arc<CacheEntry>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    EntrySummary {
        id: &entry.id,
        title: &entry.title,
        content_type: entry.content_type,
        project_id: entry.project_id.as_deref(),
        tags: &entry.tags,
        created_at: entry.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }
    .serialize(serializer)
}

/// Maximum characters kept in [`SearchResult::preview`].
pub const PREVIEW_CHARS: usize = 200;

/// Cut `text` to at most `max_chars` characters, appending `…` when cut.
pub fn make_preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &trimmed[..byte_idx]),
        None => trimmed.to_string(),
    }
}
