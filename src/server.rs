//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Service banner with the main entry points |
//! | `GET`    | `/health` | Database and cache checks |
//! | `POST`   | `/ingest/upload` | Multipart upload of a `.pdf` or `.txt` file |
//! | `GET`    | `/ingest/documents` | Paged document list (`skip`, `limit`) |
//! | `GET`    | `/ingest/documents/{id}` | One document |
//! | `DELETE` | `/ingest/documents/{id}` | Delete a document and its vectors |
//! | `POST`   | `/rag/chat` | Retrieval-augmented chat turn |
//! | `GET`    | `/rag/chat-history/{session_id}` | Recent messages of a session |
//! | `DELETE` | `/rag/chat-history/{session_id}` | Forget a session |
//! | `POST`   | `/rag/book-interview` | Create an interview booking |
//! | `GET`    | `/rag/bookings/{id}` | One booking |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Only .pdf and .txt files are supported" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `payload_too_large` (413), `internal` (500). Bodies and query strings
//! that fail to decode are `bad_request` too.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::app::AppState;
use crate::bookings::{self, BookingError, BookingRequest};
use crate::config::Config;
use crate::documents;
use crate::ingest::{ingest_document, IngestError};
use crate::models::{format_iso, vector_id, ChatMessage, Document, InterviewBooking};
use crate::rag::ChatOutcome;

const SERVICE_NAME: &str = "Backend AIML";

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.pool.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown requested, draining connections");
}

/// The full application router over `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/ingest/upload", post(handle_upload))
        .route("/ingest/documents", get(handle_list_documents))
        .route(
            "/ingest/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/rag/chat", post(handle_chat))
        .route(
            "/rag/chat-history/{session_id}",
            get(handle_get_history).delete(handle_clear_history),
        )
        .route("/rag/book-interview", post(handle_book_interview))
        .route("/rag/bookings/{id}", get(handle_get_booking))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that renders as `{"error": {"code", "message"}}`.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// 500 with `prefix` prepended to the underlying error.
fn internal(prefix: &str, err: impl std::fmt::Display) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{}{}", prefix, err),
    }
}

/// Oversized bodies surface here as 413; everything else is a malformed
/// request.
fn multipart_error(err: MultipartError) -> AppError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError {
            status,
            code: "payload_too_large".to_string(),
            message: err.body_text(),
        }
    } else {
        bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

// ============ GET / and GET /health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "endpoints": {
            "ingest": "/ingest/upload",
            "chat": "/rag/chat",
            "book_interview": "/rag/book-interview",
        }
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    /// `"healthy"` when every check passed, else `"degraded"`.
    status: &'static str,
    database: &'static str,
    cache: &'static str,
    vector_store: String,
    version: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match crate::db::ping(&state.pool).await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            "unavailable"
        }
    };
    let cache = match state.memory.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "cache health check failed");
            "unavailable"
        }
    };

    let status = if database == "connected" && cache == "connected" {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        database,
        cache,
        vector_store: state.vectors.name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ /ingest ============

/// A document as returned by the upload and single-document endpoints.
#[derive(Serialize)]
struct DocumentDetail {
    document_id: String,
    filename: String,
    file_size: i64,
    text_length: i64,
    num_chunks: i64,
    chunk_strategy: String,
    chunk_size: Option<i64>,
    uploaded_at: String,
    document_metadata: serde_json::Value,
}

impl From<Document> for DocumentDetail {
    fn from(doc: Document) -> Self {
        DocumentDetail {
            uploaded_at: format_iso(&doc.uploaded_at),
            document_id: doc.id,
            filename: doc.filename,
            file_size: doc.file_size,
            text_length: doc.text_length,
            num_chunks: doc.num_chunks,
            chunk_strategy: doc.chunk_strategy,
            chunk_size: doc.chunk_size,
            document_metadata: doc.document_metadata,
        }
    }
}

#[derive(Serialize)]
struct UploadResponse {
    #[serde(flatten)]
    document: DocumentDetail,
    message: &'static str,
}

/// Handler for `POST /ingest/upload`.
///
/// Multipart fields: `file` (required), `chunk_strategy` (default from
/// `[chunking].default_strategy`), `chunk_size` (default
/// `[chunking].default_size`).
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut strategy: Option<String> = None;
    let mut chunk_size: Option<usize> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("chunk_strategy") => {
                strategy = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("chunk_size") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let size = raw.trim().parse::<usize>().map_err(|_| {
                    bad_request(format!("chunk_size must be a positive integer, got '{}'", raw))
                })?;
                chunk_size = Some(size);
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| bad_request("Missing 'file' field"))?;
    let strategy = strategy.unwrap_or_else(|| state.config.chunking.default_strategy.clone());
    let chunk_size = chunk_size.unwrap_or(state.config.chunking.default_size);

    let doc = ingest_document(&state, &filename, bytes, &strategy, chunk_size)
        .await
        .map_err(|e| match e {
            IngestError::Internal(e) => internal("Error processing document: ", format!("{:#}", e)),
            client_error => bad_request(client_error.to_string()),
        })?;

    Ok(Json(UploadResponse {
        document: doc.into(),
        message: "Document successfully processed and stored",
    }))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_list_limit")]
    limit: i64,
}

fn default_list_limit() -> i64 {
    10
}

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<Document>,
    total_count: i64,
    skip: i64,
    limit: i64,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListResponse>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    if params.skip < 0 || params.limit < 0 {
        return Err(bad_request("skip and limit must not be negative"));
    }

    let (documents, total_count) =
        documents::list_documents(&state.pool, params.skip, params.limit)
            .await
            .map_err(|e| internal("Error retrieving documents: ", e))?;

    Ok(Json(ListResponse {
        documents,
        total_count,
        skip: params.skip,
        limit: params.limit,
    }))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDetail>, AppError> {
    let doc = documents::get_document(&state.pool, &id)
        .await
        .map_err(|e| internal("Error retrieving document: ", e))?
        .ok_or_else(|| not_found("Document not found"))?;

    Ok(Json(doc.into()))
}

/// Handler for `DELETE /ingest/documents/{id}`.
///
/// The metadata row goes first; vector cleanup failures are logged and do
/// not fail the request.
async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let doc = documents::delete_document(&state.pool, &id)
        .await
        .map_err(|e| internal("Error deleting document: ", e))?
        .ok_or_else(|| not_found("Document not found"))?;

    let ids: Vec<String> = (0..doc.num_chunks.max(0) as usize)
        .map(|idx| vector_id(&doc.id, idx))
        .collect();
    if !ids.is_empty() {
        if let Err(e) = state.vectors.delete(&ids).await {
            tracing::warn!(document_id = %doc.id, error = %e, "failed to delete document vectors");
        }
    }

    tracing::info!(document_id = %doc.id, filename = %doc.filename, "document deleted");
    Ok(Json(serde_json::json!({
        "message": "Document metadata deleted successfully",
        "document_id": doc.id,
        "filename": doc.filename,
    })))
}

// ============ /rag ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    req: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatOutcome>, AppError> {
    let Json(req) = req.map_err(|e| bad_request(e.body_text()))?;
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = state
        .rag
        .generate_response(&req.message, &session_id)
        .await
        .map_err(|e| internal("Chat error: ", format!("{:#}", e)))?;

    Ok(Json(outcome))
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<ChatMessage>,
}

async fn handle_get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let messages = state
        .memory
        .get_messages(&session_id, state.config.memory.history_limit)
        .await
        .map_err(|e| internal("Failed to get chat history: ", e))?;

    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

async fn handle_clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .memory
        .clear(&session_id)
        .await
        .map_err(|e| internal("Failed to clear chat history: ", e))?;

    Ok(Json(serde_json::json!({
        "message": "Chat history cleared",
        "session_id": session_id,
    })))
}

#[derive(Serialize)]
struct BookingResponse {
    booking_id: String,
    name: String,
    email: String,
    date: String,
    time: String,
    status: String,
}

async fn handle_book_interview(
    State(state): State<AppState>,
    req: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Json<BookingResponse>, AppError> {
    let Json(req) = req.map_err(|e| bad_request(e.body_text()))?;
    let booking = bookings::create_booking(&state.pool, &req)
        .await
        .map_err(|e| match e {
            BookingError::Invalid(msg) => bad_request(msg),
            BookingError::Storage(e) => internal("Booking failed: ", e),
        })?;

    Ok(Json(BookingResponse {
        booking_id: booking.id,
        name: booking.name,
        email: booking.email,
        date: booking.date,
        time: booking.time,
        status: booking.status.to_string(),
    }))
}

async fn handle_get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InterviewBooking>, AppError> {
    let booking = bookings::get_booking(&state.pool, &id)
        .await
        .map_err(|e| internal("Error retrieving booking: ", e))?
        .ok_or_else(|| not_found("Booking not found"))?;

    Ok(Json(booking))
}
