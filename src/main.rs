//! # Recall CLI (`recall`)
//!
//! The `recall` binary ingests documents, runs project-aware semantic
//! search, assembles RAG context, and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and run schema migrations |
//! | `recall ingest <file>` | Chunk, embed and store a document |
//! | `recall search "<query>"` | Ranked, relevance-weighted search |
//! | `recall query "<question>"` | Assemble a token-budgeted context |
//! | `recall chunk <file>` | Preview chunking without storing anything |
//! | `recall relate <src> <tgt>` | Record a project relationship |
//! | `recall serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! recall init
//! recall ingest notes/roadmap.md --owner u1 --project alpha --type knowledge
//! recall relate alpha beta --type depends_on --confidence 0.8
//! recall search "release checklist" --owner u1 --project alpha
//! recall query "what blocks the beta launch?" --owner u1 --project alpha --max-tokens 1500
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `recall=info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use recall::commands::{self, IngestArgs};
use recall::config;
use recall::engine::{RagQuery, RetrievalDefaults, SearchRequest};
use recall_core::chunk::MIN_CHUNK_CHARS;
use recall_core::models::{ContentType, ProjectRelationship};

/// Recall: project-aware semantic retrieval and context assembly.
///
/// All commands except `chunk` read a TOML configuration file given by
/// `--config`. See `config/recall.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Recall: project-aware semantic retrieval and context assembly",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Chunk, embed and store a text document.
    Ingest {
        /// Path to a UTF-8 text file.
        file: PathBuf,

        /// Owner of the content.
        #[arg(long)]
        owner: String,

        /// Project the content belongs to.
        #[arg(long)]
        project: Option<String>,

        /// Content type (`knowledge`, `conversation`, `email`, `file`,
        /// `calendar`, `transcript`).
        #[arg(long = "type", default_value = "knowledge")]
        content_type: ContentType,

        /// Title; defaults to the file name.
        #[arg(long)]
        title: Option<String>,

        /// Tags, comma separated.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Search an owner's content.
    ///
    /// Results are ranked by final score: similarity weighted by how the
    /// result's project relates to `--project`.
    Search {
        query: String,

        #[arg(long)]
        owner: String,

        /// Requesting project.
        #[arg(long)]
        project: Option<String>,

        /// Restrict to these content types, comma separated.
        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<ContentType>>,

        /// Only content created within this many days.
        #[arg(long)]
        max_age_days: Option<u32>,

        /// Minimum cosine similarity. Defaults to `retrieval.threshold`.
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum results. Defaults to `retrieval.limit`.
        #[arg(long)]
        limit: Option<usize>,

        /// Bypass the cache and read the repository directly.
        #[arg(long)]
        direct: bool,

        /// Print the full JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Assemble a token-budgeted context for a question.
    Query {
        question: String,

        #[arg(long)]
        owner: String,

        #[arg(long)]
        project: Option<String>,

        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<ContentType>>,

        #[arg(long)]
        max_age_days: Option<u32>,

        #[arg(long)]
        threshold: Option<f32>,

        #[arg(long)]
        limit: Option<usize>,

        /// Token budget. Defaults to `retrieval.max_tokens`.
        #[arg(long)]
        max_tokens: Option<usize>,

        #[arg(long)]
        direct: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show how a file would be chunked.
    Chunk {
        file: PathBuf,

        #[arg(long, default_value_t = 1000)]
        max_chunk_size: usize,

        #[arg(long, default_value_t = MIN_CHUNK_CHARS)]
        min_chunk_chars: usize,
    },

    /// Create or replace a directed project relationship.
    Relate {
        source: String,
        target: String,

        #[arg(long = "type", default_value = "related")]
        relationship_type: String,

        /// Edge confidence in `[0, 1]`.
        #[arg(long, default_value_t = 1.0)]
        confidence: f32,
    },

    /// Start the HTTP server on `server.bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "recall=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Chunk {
        file,
        max_chunk_size,
        min_chunk_chars,
    } = &cli.command
    {
        return commands::run_chunk(file, *max_chunk_size, *min_chunk_chars);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Ingest {
            file,
            owner,
            project,
            content_type,
            title,
            tags,
        } => {
            let args = IngestArgs {
                path: &file,
                owner_id: owner,
                project_id: project,
                content_type,
                title,
                tags,
            };
            commands::run_ingest(&cfg, args).await?;
        }
        Commands::Search {
            query,
            owner,
            project,
            types,
            max_age_days,
            threshold,
            limit,
            direct,
            json,
        } => {
            let defaults = RetrievalDefaults::from(&cfg.retrieval);
            let mut request = SearchRequest::with_defaults(query, owner, &defaults);
            request.project_id = project;
            request.content_types = types;
            request.max_age_days = max_age_days;
            request.threshold = threshold.unwrap_or(defaults.threshold);
            request.limit = limit.unwrap_or(defaults.limit);
            commands::run_search(&cfg, request, direct, json).await?;
        }
        Commands::Query {
            question,
            owner,
            project,
            types,
            max_age_days,
            threshold,
            limit,
            max_tokens,
            direct,
            json,
        } => {
            let defaults = RetrievalDefaults::from(&cfg.retrieval);
            let mut query = RagQuery::with_defaults(question, owner, &defaults);
            query.project_id = project;
            query.include_types = types;
            query.max_age_days = max_age_days;
            query.threshold = threshold.unwrap_or(defaults.threshold);
            query.limit = limit.unwrap_or(defaults.limit);
            query.max_tokens = max_tokens.unwrap_or(defaults.max_tokens);
            query.direct = direct;
            commands::run_query(&cfg, query, json).await?;
        }
        Commands::Relate {
            source,
            target,
            relationship_type,
            confidence,
        } => {
            let relationship = ProjectRelationship {
                source_id: source,
                target_id: target,
                relationship_type,
                confidence,
            };
            commands::run_relate(&cfg, relationship).await?;
        }
        Commands::Serve => {
            commands::run_serve(&cfg).await?;
        }
        Commands::Chunk { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
