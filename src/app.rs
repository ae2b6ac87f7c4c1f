//! Shared service handles.
//!
//! [`AppState`] bundles the SQLite pool with the three pluggable backends
//! (embedder, vector index, chat memory) and the [`RagService`] built over
//! them. The HTTP server clones it into every handler; CLI commands build
//! one for a single operation.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::memory::{create_memory, ChatMemory};
use crate::rag::RagService;
use crate::vector_store::{create_store, VectorStore};
use crate::{db, migrate};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub memory: Arc<dyn ChatMemory>,
    pub rag: RagService,
}

impl AppState {
    /// Wires already-constructed backends together.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        memory: Arc<dyn ChatMemory>,
    ) -> Self {
        let rag = RagService::new(embedder.clone(), vectors.clone(), memory.clone())
            .with_top_k(config.retrieval.top_k)
            .with_history(config.memory.history_limit, config.retrieval.history_window);

        Self {
            config: Arc::new(config),
            pool,
            embedder,
            vectors,
            memory,
            rag,
        }
    }

    /// Connects every backend named in `config`.
    ///
    /// Runs migrations first, then builds the embedder so its dimensionality
    /// can size a new vector index.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;

        if !config.embedding.is_enabled() {
            tracing::warn!("embeddings are disabled; uploads and chat will fail");
        }
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let vectors: Arc<dyn VectorStore> =
            Arc::from(create_store(&config.vector_store, embedder.dims()).await?);
        let memory: Arc<dyn ChatMemory> = Arc::from(create_memory(&config.memory).await?);

        tracing::info!(
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            vector_store = vectors.name(),
            memory = memory.name(),
            "services ready"
        );

        Ok(Self::new(config.clone(), pool, embedder, vectors, memory))
    }
}
