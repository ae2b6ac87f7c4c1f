//! Retrieval-augmented chat.
//!
//! A chat turn embeds the user's message, pulls the `top_k` closest chunks
//! from the vector index, reads the session's recent history, and assembles
//! a prompt from all three. No language model is called: the reply quotes
//! the best-matching chunk, or asks for more detail when nothing matched.
//! Both sides of the turn are then appended to the session history.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::app::AppState;
use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::memory::ChatMemory;
use crate::models::{ChatMessage, Role};
use crate::vector_store::VectorStore;

/// Characters of the top context quoted in the reply.
const PREVIEW_CHARS: usize = 200;

pub const NO_CONTEXT_REPLY: &str = "I couldn't find specific information about that in the \
     uploaded documents. Could you please provide more details?";

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    pub session_id: String,
    pub contexts_used: usize,
}

#[derive(Clone)]
pub struct RagService {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    memory: Arc<dyn ChatMemory>,
    top_k: usize,
    history_limit: usize,
    history_window: usize,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        memory: Arc<dyn ChatMemory>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            memory,
            top_k: 3,
            history_limit: 10,
            history_window: 6,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// `limit` messages are read from memory; the last `window` of those
    /// go into the prompt.
    pub fn with_history(mut self, limit: usize, window: usize) -> Self {
        self.history_limit = limit;
        self.history_window = window;
        self
    }

    /// Content of the `top_k` nearest chunks, best first. Hits without
    /// content are skipped.
    pub async fn get_context(&self, query: &str) -> Result<Vec<String>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let hits = self.vectors.query(&query_vec, self.top_k).await?;

        Ok(hits
            .iter()
            .filter_map(|hit| hit.content())
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn format_prompt(&self, query: &str, contexts: &[String], history: &[ChatMessage]) -> String {
        format_prompt(query, contexts, history, self.history_window)
    }

    pub async fn generate_response(&self, query: &str, session_id: &str) -> Result<ChatOutcome> {
        let history = self
            .memory
            .get_messages(session_id, self.history_limit)
            .await?;
        let contexts = self.get_context(query).await?;

        let prompt = self.format_prompt(query, &contexts, &history);
        tracing::debug!(
            session_id,
            contexts = contexts.len(),
            history = history.len(),
            prompt_chars = prompt.chars().count(),
            "assembled prompt"
        );

        let response = canned_reply(&contexts);

        self.memory
            .add_message(session_id, Role::User, query)
            .await?;
        self.memory
            .add_message(session_id, Role::Assistant, &response)
            .await?;

        Ok(ChatOutcome {
            response,
            session_id: session_id.to_string(),
            contexts_used: contexts.len(),
        })
    }
}

/// Builds the grounding prompt from retrieved contexts and the last
/// `history_window` messages.
pub fn format_prompt(
    query: &str,
    contexts: &[String],
    history: &[ChatMessage],
    history_window: usize,
) -> String {
    let context_str = contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| format!("Context {}: {}", i + 1, ctx))
        .collect::<Vec<_>>()
        .join("\n\n");

    let skip = history.len().saturating_sub(history_window);
    let mut history_str = String::new();
    for msg in &history[skip..] {
        let speaker = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        let _ = writeln!(history_str, "{}: {}", speaker, msg.content);
    }

    format!(
        "Based on the following context and conversation history, answer the user's question.\n\
         \n\
         Available Context:\n\
         {context_str}\n\
         \n\
         Conversation History:\n\
         {history_str}\n\
         \n\
         User Question: {query}\n\
         \n\
         Please provide a helpful answer based on the context. If the context doesn't contain \
         relevant information, say so politely."
    )
}

/// Stand-in for a model reply: quotes the top context.
pub fn canned_reply(contexts: &[String]) -> String {
    match contexts.first() {
        Some(top) => {
            let preview: String = top.chars().take(PREVIEW_CHARS).collect();
            format!("I found some relevant information: {}...", preview)
        }
        None => NO_CONTEXT_REPLY.to_string(),
    }
}

/// CLI entry point: one chat turn, printed to stdout.
pub async fn run_chat(config: &Config, message: &str, session_id: Option<String>) -> Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("message must not be empty");
    }
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let state = AppState::from_config(config).await?;
    let outcome = state.rag.generate_response(message, &session_id).await?;
    state.pool.close().await;

    println!("{}", outcome.response);
    println!();
    println!("session: {}  contexts used: {}", outcome.session_id, outcome.contexts_used);
    Ok(())
}
