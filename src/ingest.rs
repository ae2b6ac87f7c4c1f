//! Upload ingestion pipeline.
//!
//! One upload flows through: extension check → text extraction → chunking →
//! embedding → vector upsert → metadata row. The vector records carry the
//! chunk text so retrieval never has to touch SQLite.
//!
//! Vector ids are `{document_id}:{chunk_index}`, which lets a document
//! delete reach every vector it produced without a lookup table.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::app::AppState;
use crate::chunk::{chunk_text, ChunkError, ChunkStrategy};
use crate::config::Config;
use crate::documents;
use crate::embedding::embed_batched;
use crate::extract::{extract_text, is_supported, ExtractError};
use crate::models::{vector_id, ChunkMetadata, Document, VectorRecord};

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Only .pdf and .txt files are supported")]
    UnsupportedFileType,
    #[error("No text could be extracted from the file")]
    EmptyText,
    #[error(transparent)]
    InvalidChunking(#[from] ChunkError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ExtractError> for IngestError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedFileType(_) => IngestError::UnsupportedFileType,
            other => IngestError::Internal(other.into()),
        }
    }
}

/// Ingests one uploaded file and returns the stored metadata row.
///
/// `strategy` is `"paragraph"` or `"fixed"`; `chunk_size` is recorded for
/// both but only shapes chunks for `fixed`.
pub async fn ingest_document(
    state: &AppState,
    filename: &str,
    bytes: Vec<u8>,
    strategy: &str,
    chunk_size: usize,
) -> Result<Document, IngestError> {
    if !is_supported(filename) {
        return Err(IngestError::UnsupportedFileType);
    }

    let file_size = bytes.len() as i64;
    let text = extract_text(filename, bytes).await?;
    if text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }

    let strategy: ChunkStrategy = strategy.trim().parse()?;
    let chunks = chunk_text(&text, strategy, chunk_size, state.config.chunking.overlap)?;

    let document_id = Uuid::new_v4().to_string();
    tracing::info!(
        document_id = %document_id,
        filename,
        strategy = %strategy,
        chunks = chunks.len(),
        "ingesting document"
    );

    if !chunks.is_empty() {
        let vectors = embed_batched(
            state.embedder.as_ref(),
            &chunks,
            state.config.embedding.batch_size,
        )
        .await
        .context("embedding chunks")?;

        let window = match strategy {
            ChunkStrategy::Fixed => chunk_size as i64,
            ChunkStrategy::Paragraph => 0,
        };
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(idx, (content, values))| VectorRecord {
                id: vector_id(&document_id, idx),
                values,
                metadata: ChunkMetadata {
                    document_id: document_id.clone(),
                    filename: filename.to_string(),
                    chunk_index: idx as i64,
                    content: content.clone(),
                    chunk_strategy: strategy.as_str().to_string(),
                    chunk_size: window,
                },
            })
            .collect();

        state
            .vectors
            .upsert(&records)
            .await
            .context("storing vectors")?;
    }

    let doc = Document {
        id: document_id,
        filename: filename.to_string(),
        file_size,
        text_length: text.chars().count() as i64,
        num_chunks: chunks.len() as i64,
        chunk_strategy: strategy.as_str().to_string(),
        chunk_size: Some(chunk_size as i64),
        uploaded_at: Utc::now(),
        document_metadata: serde_json::json!({
            "original_filename": filename,
            "content_preview": content_preview(&text),
        }),
    };
    if let Err(e) = documents::insert_document(&state.pool, &doc).await {
        // Vectors without a row would still be retrievable by chat.
        let ids: Vec<String> = (0..chunks.len())
            .map(|idx| vector_id(&doc.id, idx))
            .collect();
        if !ids.is_empty() {
            if let Err(cleanup) = state.vectors.delete(&ids).await {
                tracing::warn!(document_id = %doc.id, error = %cleanup, "failed to remove vectors of unsaved document");
            }
        }
        return Err(e.into());
    }

    Ok(doc)
}

/// First 200 characters, with `...` appended when the text was cut.
pub fn content_preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// CLI entry point: ingests a file from disk.
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    strategy: Option<&str>,
    chunk_size: Option<usize>,
) -> anyhow::Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("not a file path: {}", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let state = AppState::from_config(config).await?;
    let strategy = strategy.unwrap_or(config.chunking.default_strategy.as_str());
    let chunk_size = chunk_size.unwrap_or(config.chunking.default_size);

    let doc = ingest_document(&state, &filename, bytes, strategy, chunk_size).await?;
    state.pool.close().await;

    println!("ingested {}", doc.filename);
    println!("  document_id: {}", doc.id);
    println!("  text_length: {}", doc.text_length);
    println!("  chunks:      {} ({})", doc.num_chunks, doc.chunk_strategy);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::memory::InMemoryChatMemory;
    use crate::vector_store::{InMemoryVectorStore, VectorStore};
    use crate::{db, migrate};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    async fn state() -> (TempDir, AppState, Arc<InMemoryVectorStore>) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("ingest.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::migrate(&pool).await.unwrap();

        let vectors = Arc::new(InMemoryVectorStore::new());
        let state = AppState::new(
            config,
            pool,
            Arc::new(LengthEmbedder),
            vectors.clone(),
            Arc::new(InMemoryChatMemory::new(20)),
        );
        (tmp, state, vectors)
    }

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short"), "short");
        let exact = "a".repeat(200);
        assert_eq!(content_preview(&exact), exact);
        let long = "é".repeat(250);
        assert_eq!(content_preview(&long), format!("{}...", "é".repeat(200)));
    }

    #[tokio::test]
    async fn test_ingest_paragraphs() {
        let (_tmp, state, vectors) = state().await;
        let body = b"First paragraph.\n\nSecond\nparagraph.\n\n\n".to_vec();

        let doc = ingest_document(&state, "notes.TXT", body, "paragraph", 1000)
            .await
            .unwrap();
        assert_eq!(doc.num_chunks, 2);
        assert_eq!(doc.chunk_strategy, "paragraph");
        assert_eq!(doc.chunk_size, Some(1000));
        assert_eq!(doc.document_metadata["original_filename"], "notes.TXT");
        assert_eq!(vectors.len(), 2);

        let hits = vectors.query(&[15.0, 1.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&format!("{}:0", doc.id).as_str()));
        assert!(ids.contains(&format!("{}:1", doc.id).as_str()));
        let second = hits.iter().find(|h| h.id.ends_with(":1")).unwrap();
        assert_eq!(second.content(), Some("Second paragraph."));
        assert_eq!(second.metadata["chunk_size"], 0);

        let stored = documents::get_document(&state.pool, &doc.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.num_chunks, 2);
    }

    #[tokio::test]
    async fn test_ingest_fixed_windows() {
        let (_tmp, state, vectors) = state().await;
        let body = "x".repeat(2500).into_bytes();

        let doc = ingest_document(&state, "big.txt", body, "fixed", 1000)
            .await
            .unwrap();
        // Windows start at 0, 800, 1600.
        assert_eq!(doc.num_chunks, 3);
        assert_eq!(doc.text_length, 2500);
        assert_eq!(vectors.len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_rejections() {
        let (_tmp, state, vectors) = state().await;

        let err = ingest_document(&state, "image.png", b"x".to_vec(), "paragraph", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType));

        let err = ingest_document(&state, "blank.txt", b" \n\n\t ".to_vec(), "paragraph", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyText));
        assert_eq!(err.to_string(), "No text could be extracted from the file");

        let err = ingest_document(&state, "a.txt", b"text".to_vec(), "sentences", 1000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidChunking(ChunkError::UnknownStrategy(_))
        ));

        let err = ingest_document(&state, "a.txt", b"text".to_vec(), "fixed", 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidChunking(ChunkError::OverlapTooLarge { .. })
        ));

        assert!(vectors.is_empty());
        let (_, total) = documents::list_documents(&state.pool, 0, 10).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_failed_row_insert_removes_vectors() {
        let (_tmp, state, vectors) = state().await;
        sqlx::query("DROP TABLE documents")
            .execute(&state.pool)
            .await
            .unwrap();

        let err = ingest_document(&state, "notes.txt", b"One.\n\nTwo.".to_vec(), "paragraph", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Internal(_)));
        assert!(vectors.is_empty());
    }
}
