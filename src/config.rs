//! TOML configuration with environment overrides.
//!
//! Every section has defaults, so a config file only needs to name what
//! differs from them. Credentials and service URLs can always be supplied
//! through the environment, which wins over the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `DATABASE_URL` | `[db].path` (accepts `sqlite://` URLs or bare paths) |
//! | `REDIS_URL` | `[memory].url` |
//! | `PINECONE_HOST` | `[vector_store].host` |
//!
//! `PINECONE_API_KEY` and `OPENAI_API_KEY` are read by the clients that need
//! them and never stored in [`Config`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/backend.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    #[serde(default = "default_chunk_size")]
    pub default_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            default_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_strategy() -> String {
    "paragraph".to_string()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_window: default_history_window(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_history_window() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Data-plane host. When set, index discovery/creation is skipped.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            index_name: default_index_name(),
            host: None,
            namespace: String::new(),
            cloud: default_cloud(),
            region: default_region(),
        }
    }
}

fn default_vector_provider() -> String {
    "pinecone".to_string()
}
fn default_index_name() -> String {
    "backend".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_provider")]
    pub provider: String,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            provider: default_memory_provider(),
            url: default_redis_url(),
            max_messages: default_max_messages(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_memory_provider() -> String {
    "redis".to_string()
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_max_messages() -> usize {
    20
}
fn default_history_limit() -> usize {
    10
}

impl Config {
    /// All-defaults config with in-process backends, used when no file is
    /// present and by tests.
    pub fn minimal() -> Self {
        let mut config = Config::default();
        config.vector_store.provider = "memory".to_string();
        config.memory.provider = "memory".to_string();
        config
    }

    /// Applies `DATABASE_URL`, `REDIS_URL` and `PINECONE_HOST` when set.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.db.path = database_path_from_url(&url);
            }
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            if !url.is_empty() {
                self.memory.url = url;
            }
        }
        if let Ok(host) = std::env::var("PINECONE_HOST") {
            if !host.is_empty() {
                self.vector_store.host = Some(host);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.default_size == 0 {
            bail!("chunking.default_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.default_size {
            bail!("chunking.overlap must be smaller than chunking.default_size");
        }
        self.chunking
            .default_strategy
            .parse::<ChunkStrategy>()
            .map_err(|e| anyhow::anyhow!("chunking.default_strategy: {}", e))?;

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.memory.max_messages < 1 {
            bail!("memory.max_messages must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
                other
            ),
        }

        match self.vector_store.provider.as_str() {
            "pinecone" | "memory" => {}
            other => bail!(
                "Unknown vector_store provider: '{}'. Must be pinecone or memory.",
                other
            ),
        }

        match self.memory.provider.as_str() {
            "redis" | "memory" => {}
            other => bail!(
                "Unknown memory provider: '{}'. Must be redis or memory.",
                other
            ),
        }

        Ok(())
    }
}

/// Turns `sqlite:///./backend.db`, `sqlite+aiosqlite:///./backend.db`,
/// `sqlite:backend.db` or a bare path into a filesystem path.
fn database_path_from_url(url: &str) -> PathBuf {
    let rest = match url.split_once(':') {
        Some((scheme, rest)) if scheme.starts_with("sqlite") => rest,
        _ => return PathBuf::from(url),
    };
    // Three slashes precede a relative path, four an absolute one.
    let path = rest
        .strip_prefix("///")
        .or_else(|| rest.strip_prefix("//"))
        .unwrap_or(rest);
    PathBuf::from(path)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env();
    config.validate()?;

    Ok(config)
}
