//! Core data models.
//!
//! Relational rows ([`Document`], [`InterviewBooking`]), cached chat turns
//! ([`ChatMessage`]) and vector-store records ([`VectorRecord`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metadata row for one ingested file.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_size: i64,
    pub text_length: i64,
    pub num_chunks: i64,
    pub chunk_strategy: String,
    pub chunk_size: Option<i64>,
    #[serde(serialize_with = "serialize_iso")]
    pub uploaded_at: DateTime<Utc>,
    pub document_metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(BookingStatus::Scheduled),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => anyhow::bail!("unknown booking status: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewBooking {
    pub id: String,
    pub name: String,
    pub email: String,
    pub date: String,
    pub time: String,
    pub status: BookingStatus,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a chat session as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Metadata attached to every vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub content: String,
    pub chunk_strategy: String,
    /// Window size for `fixed`, `0` for `paragraph`.
    pub chunk_size: i64,
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A similarity query hit. `metadata` is kept loose because the index may
/// hold records written by other tools.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

impl VectorMatch {
    pub fn content(&self) -> Option<&str> {
        self.metadata.get("content").and_then(|c| c.as_str())
    }
}

/// Vector id for chunk `index` of `document_id`.
pub fn vector_id(document_id: &str, index: usize) -> String {
    format!("{}:{}", document_id, index)
}

pub fn format_iso(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn serialize_iso<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_iso(ts))
}
