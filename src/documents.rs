//! Document metadata storage.
//!
//! Rows in `documents` are written once per upload and never updated.
//! Used by both the CLI (`rag-backend documents`) and the `/ingest/documents`
//! HTTP endpoints.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{format_iso, Document};

const COLUMNS: &str = "id, filename, file_size, text_length, num_chunks, chunk_strategy, \
                       chunk_size, uploaded_at, document_metadata";

pub async fn insert_document(pool: &SqlitePool, doc: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, filename, file_size, text_length, num_chunks, chunk_strategy, chunk_size, uploaded_at, document_metadata)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.filename)
    .bind(doc.file_size)
    .bind(doc.text_length)
    .bind(doc.num_chunks)
    .bind(&doc.chunk_strategy)
    .bind(doc.chunk_size)
    .bind(doc.uploaded_at.timestamp())
    .bind(doc.document_metadata.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// A page of documents, newest first, plus the total row count.
pub async fn list_documents(
    pool: &SqlitePool,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Document>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM documents ORDER BY uploaded_at DESC, rowid DESC LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(limit.max(0))
    .bind(skip.max(0))
    .fetch_all(pool)
    .await?;

    let docs = rows.iter().map(row_to_document).collect();
    Ok((docs, total))
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
    let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(row_to_document))
}

/// Deletes the row and returns what was deleted, or `None` if absent.
pub async fn delete_document(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let doc = row_to_document(&row);

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(doc))
}

fn row_to_document(row: &SqliteRow) -> Document {
    let uploaded_at: i64 = row.get("uploaded_at");
    let metadata_json: String = row.get("document_metadata");

    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        file_size: row.get("file_size"),
        text_length: row.get("text_length"),
        num_chunks: row.get("num_chunks"),
        chunk_strategy: row.get("chunk_strategy"),
        chunk_size: row.get("chunk_size"),
        uploaded_at: DateTime::<Utc>::from_timestamp(uploaded_at, 0).unwrap_or_default(),
        document_metadata: serde_json::from_str(&metadata_json)
            .unwrap_or(serde_json::json!({})),
    }
}

/// CLI entry point: prints a page of documents.
pub async fn run_list(config: &Config, skip: i64, limit: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let (docs, total) = list_documents(&pool, skip, limit).await?;
    pool.close().await;

    println!("documents: {} total", total);
    for doc in &docs {
        println!(
            "  {}  {}  {} bytes  {} chunks ({})  {}",
            doc.id,
            doc.filename,
            doc.file_size,
            doc.num_chunks,
            doc.chunk_strategy,
            format_iso(&doc.uploaded_at)
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("docs.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::migrate(&pool).await.unwrap();
        (tmp, pool)
    }

    fn doc(id: &str, ts: i64) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{}.txt", id),
            file_size: 10,
            text_length: 9,
            num_chunks: 2,
            chunk_strategy: "fixed".to_string(),
            chunk_size: Some(500),
            uploaded_at: DateTime::from_timestamp(ts, 0).unwrap(),
            document_metadata: serde_json::json!({ "original_filename": format!("{}.txt", id) }),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_tmp, pool) = test_pool().await;
        insert_document(&pool, &doc("a", 100)).await.unwrap();

        let got = get_document(&pool, "a").await.unwrap().unwrap();
        assert_eq!(got.filename, "a.txt");
        assert_eq!(got.chunk_size, Some(500));
        assert_eq!(got.uploaded_at.timestamp(), 100);
        assert_eq!(got.document_metadata["original_filename"], "a.txt");

        assert!(get_document(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let (_tmp, pool) = test_pool().await;
        for (id, ts) in [("old", 1), ("mid", 2), ("new", 3)] {
            insert_document(&pool, &doc(id, ts)).await.unwrap();
        }

        let (page, total) = list_documents(&pool, 0, 10).await.unwrap();
        assert_eq!(total, 3);
        let ids: Vec<&str> = page.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let (page, total) = list_documents(&pool, 1, 1).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "mid");
    }

    #[tokio::test]
    async fn test_delete_returns_row_once() {
        let (_tmp, pool) = test_pool().await;
        insert_document(&pool, &doc("gone", 5)).await.unwrap();

        let deleted = delete_document(&pool, "gone").await.unwrap().unwrap();
        assert_eq!(deleted.filename, "gone.txt");
        assert!(delete_document(&pool, "gone").await.unwrap().is_none());
        assert!(get_document(&pool, "gone").await.unwrap().is_none());
    }
}
