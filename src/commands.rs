//! CLI command implementations.
//!
//! Each `run_*` function backs one `recall` subcommand. They build the
//! engine from config, call into the library, and print either a
//! human-readable summary or JSON (`--json`).

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use recall_core::chunk::{chunk_text, is_trivial_chunk};
use recall_core::models::{ContentDetails, ContentType, ProjectRelationship};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::engine::{EngineSettings, RagQuery, SearchEngine, SearchOutcome, SearchRequest};
use crate::ingest::NewContent;
use crate::migrate;
use crate::repository::{
    validate_relationship, RelationshipStore, SqliteRelationshipStore, SqliteRepository,
};
use crate::server;

/// Connect to the database, migrate, and wire up a [`SearchEngine`].
pub async fn open_engine(config: &Config) -> Result<SearchEngine> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let provider = create_provider(&config.embedding)?;

    Ok(SearchEngine::new(
        provider,
        Arc::new(SqliteRepository::new(pool.clone())),
        Arc::new(SqliteRelationshipStore::new(pool)),
        EngineSettings::from_config(config),
    ))
}

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!(
        "Database initialized at {}",
        config.repository.path.display()
    );
    Ok(())
}

/// Options for `recall ingest`.
pub struct IngestArgs<'a> {
    pub path: &'a Path,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub content_type: ContentType,
    pub title: Option<String>,
    pub tags: Vec<String>,
}

pub async fn run_ingest(config: &Config, args: IngestArgs<'_>) -> Result<()> {
    let body = std::fs::read_to_string(args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let file_name = args
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.path.display().to_string());

    let details = match args.content_type {
        ContentType::Knowledge => ContentDetails::Knowledge {
            source_path: Some(args.path.display().to_string()),
        },
        ContentType::File => ContentDetails::File {
            file_name: file_name.clone(),
            mime_type: None,
            size_bytes: Some(body.len() as u64),
        },
        _ => ContentDetails::Unstructured,
    };

    let mut content = NewContent::new(
        args.owner_id,
        args.content_type,
        args.title.unwrap_or(file_name),
        body,
    );
    content.project_id = args.project_id;
    content.tags = args.tags;
    content.details = details;

    let engine = open_engine(config).await?;
    let report = engine.ingest(content).await?;

    println!("Ingested {}", args.path.display());
    println!("  parent_id: {}", report.parent_id);
    println!("  chunks:    {}", report.chunks_total);
    println!("  indexed:   {}", report.chunks_indexed);
    println!("  trivial:   {}", report.chunks_skipped_trivial);
    println!("  failed:    {}", report.chunks_failed);
    Ok(())
}

pub async fn run_search(
    config: &Config,
    request: SearchRequest,
    direct: bool,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let outcome = if direct {
        engine.search_direct(&request).await?
    } else {
        engine.search(&request).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome) {
    if outcome.results.is_empty() {
        println!("No results.");
    }
    for (i, result) in outcome.results.iter().enumerate() {
        let entry = &result.entry;
        let context = match &result.project_context {
            Some(c) if c.is_direct_match() => " [project]",
            Some(_) => " [related]",
            None => "",
        };
        println!(
            "{}. [{:.3}] {} ({}){}",
            i + 1,
            result.final_score,
            entry.title,
            entry.content_type,
            context
        );
        println!(
            "    similarity: {:.3}  project: {}  id: {}",
            result.similarity,
            entry.project_id.as_deref().unwrap_or("-"),
            entry.id
        );
        println!("    {}", result.preview.replace('\n', " "));
    }

    println!();
    println!(
        "searched {} of {} candidates, returned {}",
        outcome.stats.searched, outcome.stats.total_candidates, outcome.stats.included
    );
    for suggestion in &outcome.insights.suggestions {
        println!("hint: {}", suggestion);
    }
}

pub async fn run_query(config: &Config, query: RagQuery, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let response = engine.query(&query, None).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.sources.is_empty() {
        println!("No relevant context found.");
        return Ok(());
    }
    println!("{}", response.context);
    println!("--- sources ---");
    for source in &response.sources {
        println!(
            "[{:.3}] {} ({})  id: {}",
            source.final_score, source.title, source.content_type, source.id
        );
    }
    let stats = &response.compression_stats;
    println!(
        "context: {} bytes from {} bytes (ratio {:.2})",
        stats.compressed_size, stats.original_context_size, stats.compression_ratio
    );
    Ok(())
}

/// Preview how a file would be chunked. Needs no database.
pub fn run_chunk(path: &Path, max_chunk_size: usize, min_chunk_chars: usize) -> Result<()> {
    if max_chunk_size < 1 {
        bail!("--max-chunk-size must be >= 1");
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let chunks = chunk_text(&text, max_chunk_size);
    for (i, chunk) in chunks.iter().enumerate() {
        let marker = if is_trivial_chunk(chunk, min_chunk_chars) {
            " (trivial, skipped on ingest)"
        } else {
            ""
        };
        println!(
            "--- chunk {}/{}: {} chars{} ---",
            i + 1,
            chunks.len(),
            chunk.chars().count(),
            marker
        );
        println!("{}", chunk);
    }
    if chunks.is_empty() {
        println!("No chunks.");
    }
    Ok(())
}

pub async fn run_relate(config: &Config, relationship: ProjectRelationship) -> Result<()> {
    validate_relationship(&relationship)?;

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = SqliteRelationshipStore::new(pool.clone());
    store.upsert(&relationship).await?;
    pool.close().await;

    println!(
        "{} -> {} ({}, confidence {:.2})",
        relationship.source_id,
        relationship.target_id,
        relationship.relationship_type,
        relationship.confidence
    );
    Ok(())
}

pub async fn run_serve(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    tracing::info!(
        model = engine.provider().model_name(),
        ttl_secs = config.cache.ttl_secs,
        "starting recall server"
    );
    server::run_server(Arc::new(engine), &config.server.bind).await
}
