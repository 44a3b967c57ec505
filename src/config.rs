//! TOML configuration parsing and validation.
//!
//! Every section has serde defaults, so a minimal file only needs the
//! `[repository]` path. See [`load_config`] for validation rules.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use recall_core::models::EMBEDDING_DIMS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    pub path: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/recall.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per HTTP request. The whole call, retries included, is bounded by
    /// [`crate::embedding::call_budget`].
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    8000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Cap passed to the repository when listing eligible ids.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            fetch_concurrency: default_fetch_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    30 * 60
}
fn default_max_entries() -> usize {
    100
}
fn default_fetch_concurrency() -> usize {
    8
}
fn default_fetch_timeout_secs() -> u64 {
    10
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_direct_match_boost")]
    pub direct_match_boost: f32,
    #[serde(default = "default_temporal_decay")]
    pub temporal_decay: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            limit: default_limit(),
            max_tokens: default_max_tokens(),
            direct_match_boost: default_direct_match_boost(),
            temporal_decay: default_temporal_decay(),
        }
    }
}

fn default_threshold() -> f32 {
    0.6
}
fn default_limit() -> usize {
    10
}
fn default_max_tokens() -> usize {
    2000
}
fn default_direct_match_boost() -> f32 {
    recall_core::relevance::DEFAULT_DIRECT_MATCH_BOOST
}
fn default_temporal_decay() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_chars: default_min_chunk_chars(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1000
}
fn default_min_chunk_chars() -> usize {
    recall_core::chunk::MIN_CHUNK_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config TOML.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    let r = &config.retrieval;
    if !r.threshold.is_finite() || !(-1.0..=1.0).contains(&r.threshold) {
        bail!("retrieval.threshold must be in [-1.0, 1.0]");
    }
    if r.limit < 1 {
        bail!("retrieval.limit must be >= 1");
    }
    if r.max_tokens < 1 {
        bail!("retrieval.max_tokens must be >= 1");
    }
    if r.direct_match_boost <= 0.0 {
        bail!("retrieval.direct_match_boost must be > 0");
    }

    // Validate cache
    if config.cache.ttl_secs < 1 {
        bail!("cache.ttl_secs must be >= 1");
    }
    if config.cache.max_entries < 1 {
        bail!("cache.max_entries must be >= 1");
    }
    if config.cache.fetch_concurrency < 1 {
        bail!("cache.fetch_concurrency must be >= 1");
    }

    // Validate chunking
    if config.chunking.max_chunk_size < 1 {
        bail!("chunking.max_chunk_size must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        match config.embedding.dims {
            Some(EMBEDDING_DIMS) => {}
            Some(other) => bail!(
                "embedding.dims must be {} (got {}); all vectors share one dimensionality",
                EMBEDDING_DIMS,
                other
            ),
            None => bail!(
                "embedding.dims must be set to {} when provider is '{}'",
                EMBEDDING_DIMS,
                config.embedding.provider
            ),
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}
