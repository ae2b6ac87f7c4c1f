//! Vector index abstraction.
//!
//! [`VectorStore`] is the seam between the pipeline and the external index.
//! Two backends are provided:
//!
//! - **[`PineconeStore`]**: Pinecone's REST API (serverless index). The index
//!   is looked up on startup and created if missing.
//! - **[`InMemoryVectorStore`]**: brute-force cosine similarity over a
//!   `RwLock<Vec<_>>`, for local runs and tests.
//!
//! | Config `[vector_store].provider` | Backend |
//! |-----------------------------------|---------|
//! | `"pinecone"` | [`PineconeStore`] |
//! | `"memory"` | [`InMemoryVectorStore`] |

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::VectorStoreConfig;
use crate::embedding::cosine_similarity;
use crate::models::{VectorMatch, VectorRecord};

const PINECONE_CONTROL_PLANE: &str = "https://api.pinecone.io";
const PINECONE_API_VERSION: &str = "2024-07";
const UPSERT_BATCH: usize = 100;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs and `/health`.
    fn name(&self) -> &str;

    /// Insert or overwrite records by id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// The `top_k` nearest records to `vector`, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;

    /// Remove records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// Build the backend named by `config.provider`.
///
/// `dims` is the embedding dimensionality, used when a Pinecone index has
/// to be created.
pub async fn create_store(config: &VectorStoreConfig, dims: usize) -> Result<Box<dyn VectorStore>> {
    match config.provider.as_str() {
        "memory" => Ok(Box::new(InMemoryVectorStore::new())),
        "pinecone" => Ok(Box::new(PineconeStore::connect(config, dims).await?)),
        other => bail!("Unknown vector_store provider: {}", other),
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;

        let mut scored: Vec<(f32, &VectorRecord)> = stored
            .iter()
            .map(|r| (cosine_similarity(vector, &r.values), r))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, r)| {
                Ok(VectorMatch {
                    id: r.id.clone(),
                    score,
                    metadata: serde_json::to_value(&r.metadata)?,
                })
            })
            .collect()
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        stored.retain(|r| !ids.contains(&r.id));
        Ok(())
    }
}

// ============ Pinecone ============

/// Pinecone serverless index over REST.
///
/// Requires `PINECONE_API_KEY`. The data-plane host comes from
/// `[vector_store].host` / `PINECONE_HOST`, or from describing the index.
pub struct PineconeStore {
    client: reqwest::Client,
    api_key: String,
    host: String,
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl PineconeStore {
    pub async fn connect(config: &VectorStoreConfig, dims: usize) -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow!("PINECONE_API_KEY is not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let host = match &config.host {
            Some(host) => host.clone(),
            None => ensure_index(&client, &api_key, config, dims).await?,
        };

        tracing::info!(index = %config.index_name, host = %host, "using Pinecone index");

        Ok(Self {
            client,
            api_key,
            host: normalize_host(&host),
            namespace: config.namespace.clone(),
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Pinecone {} failed with {}: {}", path, status, text);
        }

        // Delete returns `{}`; an empty body is fine too.
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH) {
            let vectors: Vec<serde_json::Value> = batch
                .iter()
                .map(|r| {
                    Ok(serde_json::json!({
                        "id": r.id,
                        "values": r.values,
                        "metadata": serde_json::to_value(&r.metadata)?,
                    }))
                })
                .collect::<Result<_>>()?;

            self.post(
                "/vectors/upsert",
                serde_json::json!({ "vectors": vectors, "namespace": self.namespace }),
            )
            .await?;
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let json = self
            .post(
                "/query",
                serde_json::json!({
                    "vector": vector,
                    "topK": top_k,
                    "includeMetadata": true,
                    "namespace": self.namespace,
                }),
            )
            .await?;
        parse_query_response(json)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post(
            "/vectors/delete",
            serde_json::json!({ "ids": ids, "namespace": self.namespace }),
        )
        .await?;
        Ok(())
    }
}

fn parse_query_response(json: serde_json::Value) -> Result<Vec<VectorMatch>> {
    let response: QueryResponse = serde_json::from_value(json)?;
    Ok(response
        .matches
        .into_iter()
        .map(|m| VectorMatch {
            id: m.id,
            score: m.score,
            metadata: m.metadata.unwrap_or_else(|| serde_json::json!({})),
        })
        .collect())
}

/// Describe the index, creating it when it does not exist. Returns its host.
async fn ensure_index(
    client: &reqwest::Client,
    api_key: &str,
    config: &VectorStoreConfig,
    dims: usize,
) -> Result<String> {
    let describe_url = format!("{}/indexes/{}", PINECONE_CONTROL_PLANE, config.index_name);

    let response = client
        .get(&describe_url)
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
        .send()
        .await?;

    match response.status() {
        s if s.is_success() => return index_host(response.json().await?),
        StatusCode::NOT_FOUND => {}
        s => {
            let text = response.text().await.unwrap_or_default();
            bail!("Pinecone describe index failed with {}: {}", s, text);
        }
    }

    if dims == 0 {
        bail!(
            "Pinecone index '{}' does not exist and embedding dimensionality is unknown",
            config.index_name
        );
    }

    tracing::info!(index = %config.index_name, dims, "creating Pinecone index");
    let body = serde_json::json!({
        "name": config.index_name,
        "dimension": dims,
        "metric": "cosine",
        "spec": { "serverless": { "cloud": config.cloud, "region": config.region } },
    });

    let response = client
        .post(format!("{}/indexes", PINECONE_CONTROL_PLANE))
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return index_host(response.json().await?);
    }
    if status == StatusCode::CONFLICT {
        // Created concurrently by another instance.
        let response = client
            .get(&describe_url)
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .send()
            .await?
            .error_for_status()?;
        return index_host(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    bail!("Pinecone create index failed with {}: {}", status, text)
}

fn index_host(description: IndexDescription) -> Result<String> {
    description
        .host
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow!("Pinecone index description has no host yet"))
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use axum::extract::State;
    use axum::http::{HeaderMap, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct SeenRequest {
        path: String,
        api_key: Option<String>,
        body: serde_json::Value,
    }

    /// Records every data-plane call; fails the next one when `fail_next` is set.
    #[derive(Default)]
    struct MockPinecone {
        requests: Mutex<Vec<SeenRequest>>,
        fail_next: AtomicBool,
    }

    async fn mock_handler(
        State(mock): State<Arc<MockPinecone>>,
        uri: Uri,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Response {
        let path = uri.path().to_string();
        mock.requests.lock().unwrap().push(SeenRequest {
            path: path.clone(),
            api_key: headers
                .get("Api-Key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });

        if mock.fail_next.swap(false, Ordering::SeqCst) {
            return (StatusCode::INTERNAL_SERVER_ERROR, "index unavailable").into_response();
        }
        match path.as_str() {
            "/query" => Json(serde_json::json!({
                "matches": [{ "id": "d:7", "score": 0.88, "metadata": { "content": "seven" } }],
                "namespace": "docs"
            }))
            .into_response(),
            _ => Json(serde_json::json!({})).into_response(),
        }
    }

    async fn spawn_mock() -> (Arc<MockPinecone>, String) {
        let mock = Arc::new(MockPinecone::default());
        let app = Router::new().fallback(mock_handler).with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (mock, format!("http://{}/", addr))
    }

    fn record(id: &str, values: Vec<f32>, content: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata {
                document_id: "doc".to_string(),
                filename: "doc.txt".to_string(),
                chunk_index: 0,
                content: content.to_string(),
                chunk_strategy: "paragraph".to_string(),
                chunk_size: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_memory_query_ranks_by_cosine() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                record("x", vec![1.0, 0.0], "east"),
                record("y", vec![0.0, 1.0], "north"),
                record("z", vec![0.7, 0.7], "north-east"),
            ])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "x");
        assert_eq!(hits[1].id, "z");
        assert_eq!(hits[0].content(), Some("east"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_memory_upsert_overwrites_and_delete_removes() {
        let store = InMemoryVectorStore::new();
        store.upsert(&[record("a", vec![1.0], "v1")]).await.unwrap();
        store.upsert(&[record("a", vec![1.0], "v2")]).await.unwrap();
        assert_eq!(store.len(), 1);

        let hits = store.query(&[1.0], 5).await.unwrap();
        assert_eq!(hits[0].content(), Some("v2"));

        store
            .delete(&["a".to_string(), "unknown".to_string()])
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_query_empty_store() {
        let store = InMemoryVectorStore::new();
        assert!(store.query(&[1.0, 2.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pinecone_data_plane_requests() {
        let (mock, host) = spawn_mock().await;
        std::env::set_var("PINECONE_API_KEY", "test-key");
        let config = VectorStoreConfig {
            provider: "pinecone".to_string(),
            host: Some(host),
            namespace: "docs".to_string(),
            ..Default::default()
        };
        let store = PineconeStore::connect(&config, 3).await.unwrap();

        let records: Vec<VectorRecord> = (0..250)
            .map(|i| record(&format!("d:{}", i), vec![i as f32, 1.0, 0.0], "chunk"))
            .collect();
        store.upsert(&records).await.unwrap();

        let hits = store.query(&[1.0, 0.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "d:7");
        assert_eq!(hits[0].content(), Some("seven"));

        store
            .delete(&["d:0".to_string(), "d:1".to_string()])
            .await
            .unwrap();
        // An empty delete never reaches the index.
        store.delete(&[]).await.unwrap();

        let requests = mock.requests.lock().unwrap().clone();
        let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/vectors/upsert",
                "/vectors/upsert",
                "/vectors/upsert",
                "/query",
                "/vectors/delete"
            ]
        );
        assert!(requests
            .iter()
            .all(|r| r.api_key.as_deref() == Some("test-key")));
        assert!(requests.iter().all(|r| r.body["namespace"] == "docs"));

        let batch_sizes: Vec<usize> = requests[..3]
            .iter()
            .map(|r| r.body["vectors"].as_array().unwrap().len())
            .collect();
        assert_eq!(batch_sizes, vec![100, 100, 50]);
        let first = &requests[0].body["vectors"][0];
        assert_eq!(first["id"], "d:0");
        assert_eq!(first["metadata"]["content"], "chunk");
        assert_eq!(requests[2].body["vectors"][49]["id"], "d:249");

        let query = &requests[3].body;
        assert_eq!(query["topK"], 3);
        assert_eq!(query["includeMetadata"], true);
        assert_eq!(query["vector"].as_array().unwrap().len(), 3);

        assert_eq!(requests[4].body["ids"], serde_json::json!(["d:0", "d:1"]));

        mock.fail_next.store(true, Ordering::SeqCst);
        let err = store.query(&[1.0, 0.0, 0.0], 3).await.unwrap_err().to_string();
        assert!(err.contains("500"), "{}", err);
        assert!(err.contains("index unavailable"), "{}", err);
    }

    #[test]
    fn test_parse_query_response() {
        let json = serde_json::json!({
            "matches": [
                { "id": "d:0", "score": 0.93, "metadata": { "content": "alpha", "chunk_index": 0 } },
                { "id": "d:1", "score": 0.41 }
            ],
            "namespace": ""
        });
        let hits = parse_query_response(json).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content(), Some("alpha"));
        assert_eq!(hits[1].content(), None);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("backend-abc.svc.pinecone.io"),
            "https://backend-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn test_index_host_requires_host() {
        assert!(index_host(IndexDescription { host: None }).is_err());
        assert!(index_host(IndexDescription {
            host: Some(String::new())
        })
        .is_err());
        assert_eq!(
            index_host(IndexDescription {
                host: Some("h".to_string())
            })
            .unwrap(),
            "h"
        );
    }
}
