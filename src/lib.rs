//! # RAG backend
//!
//! Document ingestion and retrieval-augmented chat over an HTTP API.
//!
//! Uploaded `.pdf` and `.txt` files are split into chunks, embedded, and
//! written to a vector index; their metadata lives in SQLite. Chat turns
//! retrieve the closest chunks, combine them with the session's recent
//! history (kept in Redis), and answer from the best match. Interview
//! bookings are stored alongside the document metadata.
//!
//! ## Architecture
//!
//! ```text
//!  upload ──▶ extract ──▶ chunk ──▶ embed ──▶ ┌──────────────┐
//!                                    │        │ vector index │
//!                                    ▼        └──────┬───────┘
//!                              ┌──────────┐          │
//!                              │  SQLite  │          ▼
//!                              │ metadata │   chat ◀── history (Redis)
//!                              └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and env overrides |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from uploads |
//! | [`chunk`] | Paragraph and fixed-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | Vector index abstraction (Pinecone, in-memory) |
//! | [`memory`] | Chat history (Redis, in-memory) |
//! | [`rag`] | Retrieval, prompt assembly, replies |
//! | [`ingest`] | Upload pipeline |
//! | [`documents`] | Document metadata queries |
//! | [`bookings`] | Interview bookings |
//! | [`app`] | Shared service handles |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod bookings;
pub mod chunk;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod server;
pub mod vector_store;
