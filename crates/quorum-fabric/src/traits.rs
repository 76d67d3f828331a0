//! Pluggable collaborator contracts.
//!
//! Every external collaborator — the durable log, the vector store, the
//! document chunker, the LLM service — and every in-process seam (message
//! handlers, the agent-facing controller surface) is an async trait.
//! In-memory defaults live in [`defaults`](crate::defaults).

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{HandlerError, LlmError, RetrievalError, SinkError};
use crate::types::{AgentCapability, Message, MessagePayload, TaskStatus};

// ---------------------------------------------------------------------------
// MessageHandler
// ---------------------------------------------------------------------------

/// An in-process message consumer, registered on the bus (per agent id) or
/// on the controller (per message kind).
///
/// Handlers run concurrently on bus workers and must be re-entrant. A
/// returned error is logged with the message id and isolated — other
/// handlers of the same message still run.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<(), HandlerError>;
}

// ---------------------------------------------------------------------------
// ControlPlane
// ---------------------------------------------------------------------------

/// The subset of controller operations an agent depends on, injected at
/// agent construction. Keeping the surface narrow breaks the agent ↔
/// controller reference cycle at the type level.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Register an agent. Returns false (no state change) when the id is
    /// already taken.
    async fn register_agent(
        &self,
        agent_id: &str,
        name: &str,
        capabilities: BTreeSet<AgentCapability>,
        metadata: BTreeMap<String, Value>,
    ) -> bool;

    /// Remove an agent from the registry and every capability routing list.
    async fn unregister_agent(&self, agent_id: &str) -> bool;

    /// Create a message, record it, publish it, and run in-process
    /// handlers. Returns the message id.
    async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        payload: MessagePayload,
    ) -> String;

    /// Create a task and immediately attempt assignment. The returned id is
    /// valid even when no agent matched — the task stays pending.
    async fn create_task(
        &self,
        description: &str,
        creator_id: &str,
        required_capabilities: BTreeSet<AgentCapability>,
        priority: i32,
        deadline: Option<chrono::DateTime<chrono::Utc>>,
        metadata: BTreeMap<String, Value>,
    ) -> String;

    /// Transition a task and optionally record its result. Terminal
    /// transitions notify the task creator.
    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<BTreeMap<String, Value>>,
    ) -> bool;
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// The durable log every published message is forwarded to.
///
/// The bus calls [`send()`](Self::send) fire-and-forget, keyed by message
/// id; failures are logged and never propagated to publishers.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn send(&self, topic: &str, key: &str, message: &Message) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// VectorStore
// ---------------------------------------------------------------------------

/// A single hit from a vector-store search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Vector-database contract. A `namespace` of `None` addresses the default
/// namespace on both the write and read paths.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store chunks with their metadata. Returns the generated chunk ids.
    async fn add_documents(
        &self,
        chunks: &[String],
        metadatas: &[BTreeMap<String, Value>],
        namespace: Option<&str>,
    ) -> Result<Vec<String>, RetrievalError>;

    /// Pure vector similarity search.
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&BTreeMap<String, Value>>,
        namespace: Option<&str>,
    ) -> Result<Vec<SearchResult>, RetrievalError>;

    /// Convex combination of vector and keyword scoring.
    /// `alpha` ∈ [0, 1]: 0 = pure vector, 1 = pure keyword.
    async fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&BTreeMap<String, Value>>,
        namespace: Option<&str>,
        alpha: f64,
    ) -> Result<Vec<SearchResult>, RetrievalError>;

    /// Delete by chunk id. Returns the number of chunks removed.
    async fn delete_documents(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<usize, RetrievalError>;

    /// Delete every chunk whose metadata matches the filter point-wise.
    async fn delete_documents_by_filter(
        &self,
        filter: &BTreeMap<String, Value>,
        namespace: Option<&str>,
    ) -> Result<usize, RetrievalError>;

    /// Implementation-defined statistics (document counts etc.).
    async fn stats(&self) -> BTreeMap<String, Value>;
}

// ---------------------------------------------------------------------------
// DocumentChunker
// ---------------------------------------------------------------------------

/// Splits a document into ordered chunks for indexing.
///
/// Implementations prefer natural boundaries (paragraphs, sentences) and
/// fall back to fixed-size windowing when a span cannot be packed.
pub trait DocumentChunker: Send + Sync {
    fn split(&self, text: &str, size: usize, overlap: usize) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// LlmService
// ---------------------------------------------------------------------------

/// Text-generation collaborator. Synchronous relative to the caller.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError>;
}
