//! Knowledge retrieval: chunking documents into a vector store and
//! querying it back for agents.

mod chunker;

pub use chunker::BoundaryChunker;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::RetrieverConfig;
use crate::traits::{DocumentChunker, SearchResult, VectorStore};

/// Metadata key identifying the parent document of a chunk.
pub const DOCUMENT_ID_KEY: &str = "document_id";

/// Composes the chunker and the vector store behind one query surface.
///
/// Collaborator failures never escape: a failed search yields an empty
/// result list and a log line, a failed write reports `false`.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    chunker: Arc<dyn DocumentChunker>,
    config: RetrieverConfig,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        chunker: Arc<dyn DocumentChunker>,
        config: RetrieverConfig,
        chunker_config: crate::config::ChunkerConfig,
    ) -> Self {
        tracing::info!(
            top_k = config.top_k,
            alpha = config.alpha,
            use_hybrid_search = config.use_hybrid_search,
            "retriever initialized"
        );
        Self {
            store,
            chunker,
            config,
            chunk_size: chunker_config.chunk_size,
            chunk_overlap: chunker_config.chunk_overlap,
        }
    }

    /// Chunk a document and index it. Each chunk inherits the document
    /// metadata plus `chunk_index`, `total_chunks`, and a `document_id`
    /// (generated when absent).
    pub async fn add_document(
        &self,
        content: &str,
        metadata: BTreeMap<String, Value>,
        namespace: Option<&str>,
    ) -> bool {
        let chunks = self
            .chunker
            .split(content, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            tracing::warn!("document produced no chunks");
            return false;
        }

        let document_id = metadata
            .get(DOCUMENT_ID_KEY)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let total = chunks.len();
        let metadatas: Vec<BTreeMap<String, Value>> = (0..total)
            .map(|i| {
                let mut m = metadata.clone();
                m.insert("chunk_index".to_string(), json!(i));
                m.insert("total_chunks".to_string(), json!(total));
                m.insert(DOCUMENT_ID_KEY.to_string(), json!(document_id));
                m
            })
            .collect();

        match self.store.add_documents(&chunks, &metadatas, namespace).await {
            Ok(ids) => {
                tracing::info!(document_id = %document_id, chunks = ids.len(), "document indexed");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to index document");
                false
            }
        }
    }

    /// Index a batch of documents. Returns true only when every document
    /// was indexed.
    pub async fn add_documents(
        &self,
        contents: &[String],
        metadatas: &[BTreeMap<String, Value>],
        namespace: Option<&str>,
    ) -> bool {
        if contents.is_empty() {
            tracing::warn!("cannot add an empty document list");
            return false;
        }
        let mut all_ok = true;
        for (i, content) in contents.iter().enumerate() {
            let metadata = metadatas.get(i).cloned().unwrap_or_default();
            if !self.add_document(content, metadata, namespace).await {
                all_ok = false;
            }
        }
        all_ok
    }

    /// Retrieve relevant chunks for a query. Hybrid search is used when
    /// requested, with `alpha` falling back to the configured default.
    pub async fn query(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&BTreeMap<String, Value>>,
        namespace: Option<&str>,
        use_hybrid_search: bool,
        alpha: Option<f64>,
    ) -> Vec<SearchResult> {
        let outcome = if use_hybrid_search {
            let alpha = alpha.unwrap_or(self.config.alpha);
            self.store
                .hybrid_search(query, top_k, filter, namespace, alpha)
                .await
        } else {
            self.store
                .similarity_search(query, top_k, filter, namespace)
                .await
        };
        match outcome {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(query, error = %e, "retrieval failed");
                Vec::new()
            }
        }
    }

    /// Query with the configured defaults.
    pub async fn query_default(&self, query: &str) -> Vec<SearchResult> {
        self.query(
            query,
            self.config.top_k,
            None,
            None,
            self.config.use_hybrid_search,
            None,
        )
        .await
    }

    pub async fn delete_documents(&self, ids: &[String], namespace: Option<&str>) -> bool {
        match self.store.delete_documents(ids, namespace).await {
            Ok(removed) => {
                tracing::info!(removed, "documents deleted");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to delete documents");
                false
            }
        }
    }

    pub async fn delete_documents_by_filter(
        &self,
        filter: &BTreeMap<String, Value>,
        namespace: Option<&str>,
    ) -> bool {
        match self.store.delete_documents_by_filter(filter, namespace).await {
            Ok(removed) => {
                tracing::info!(removed, "documents deleted by filter");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to delete documents by filter");
                false
            }
        }
    }

    /// Store statistics plus the retriever's effective defaults.
    pub async fn status(&self) -> BTreeMap<String, Value> {
        let mut status = BTreeMap::new();
        status.insert(
            "vector_store".to_string(),
            Value::Object(self.store.stats().await.into_iter().collect()),
        );
        status.insert("default_top_k".to_string(), json!(self.config.top_k));
        status.insert("default_alpha".to_string(), json!(self.config.alpha));
        status.insert(
            "use_hybrid_search".to_string(),
            json!(self.config.use_hybrid_search),
        );
        status
    }
}
