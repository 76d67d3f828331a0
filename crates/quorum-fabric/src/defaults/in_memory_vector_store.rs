//! In-memory vector store with term-frequency scoring.
//!
//! The vector leg is cosine similarity over term-frequency maps; the
//! keyword leg is the fraction of distinct query terms present in a chunk.
//! Hybrid search blends them as `(1 - alpha) * vector + alpha * keyword`.
//! Good enough to exercise retrieval flows without an embedding backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::errors::RetrievalError;
use crate::traits::{SearchResult, VectorStore};

struct StoredChunk {
    id: String,
    namespace: String,
    content: String,
    terms: HashMap<String, f64>,
    metadata: BTreeMap<String, Value>,
}

/// `HashMap`-backed store; the default namespace is the empty string.
#[derive(Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&BTreeMap<String, Value>>,
        namespace: Option<&str>,
        alpha: f64,
    ) -> Vec<SearchResult> {
        let namespace = namespace.unwrap_or("");
        let query_terms = term_freq(query);
        let chunks = self.chunks.read().await;

        let mut scored: Vec<SearchResult> = chunks
            .iter()
            .filter(|c| c.namespace == namespace && matches_filter(&c.metadata, filter))
            .map(|c| {
                let vector = cosine(&query_terms, &c.terms);
                let keyword = keyword_overlap(&query_terms, &c.terms);
                SearchResult {
                    document_id: c.id.clone(),
                    content: c.content.clone(),
                    score: (1.0 - alpha) * vector + alpha * keyword,
                    metadata: c.metadata.clone(),
                }
            })
            .collect();

        // Stable sort keeps insertion order among ties.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_documents(
        &self,
        chunks: &[String],
        metadatas: &[BTreeMap<String, Value>],
        namespace: Option<&str>,
    ) -> Result<Vec<String>, RetrievalError> {
        if chunks.len() != metadatas.len() {
            return Err(RetrievalError::LengthMismatch {
                documents: chunks.len(),
                metadatas: metadatas.len(),
            });
        }
        let namespace = namespace.unwrap_or("").to_string();
        let mut stored = self.chunks.write().await;
        let mut ids = Vec::with_capacity(chunks.len());
        for (content, metadata) in chunks.iter().zip(metadatas) {
            let id = uuid::Uuid::new_v4().to_string();
            stored.push(StoredChunk {
                id: id.clone(),
                namespace: namespace.clone(),
                content: content.clone(),
                terms: term_freq(content),
                metadata: metadata.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&BTreeMap<String, Value>>,
        namespace: Option<&str>,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        Ok(self.search(query, top_k, filter, namespace, 0.0).await)
    }

    async fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&BTreeMap<String, Value>>,
        namespace: Option<&str>,
        alpha: f64,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let alpha = alpha.clamp(0.0, 1.0);
        Ok(self.search(query, top_k, filter, namespace, alpha).await)
    }

    async fn delete_documents(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<usize, RetrievalError> {
        let namespace = namespace.unwrap_or("");
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| !(c.namespace == namespace && ids.contains(&c.id)));
        Ok(before - chunks.len())
    }

    async fn delete_documents_by_filter(
        &self,
        filter: &BTreeMap<String, Value>,
        namespace: Option<&str>,
    ) -> Result<usize, RetrievalError> {
        let namespace = namespace.unwrap_or("");
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| !(c.namespace == namespace && matches_filter(&c.metadata, Some(filter))));
        Ok(before - chunks.len())
    }

    async fn stats(&self) -> BTreeMap<String, Value> {
        let chunks = self.chunks.read().await;
        let namespaces: std::collections::BTreeSet<&str> =
            chunks.iter().map(|c| c.namespace.as_str()).collect();
        BTreeMap::from([
            ("chunks".to_string(), json!(chunks.len())),
            ("namespaces".to_string(), json!(namespaces.len())),
        ])
    }
}

/// Point-wise metadata equality; `None` matches everything.
fn matches_filter(
    metadata: &BTreeMap<String, Value>,
    filter: Option<&BTreeMap<String, Value>>,
) -> bool {
    filter.map_or(true, |f| f.iter().all(|(k, v)| metadata.get(k) == Some(v)))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn term_freq(text: &str) -> HashMap<String, f64> {
    let mut freq = HashMap::new();
    for term in tokenize(text) {
        *freq.entry(term).or_insert(0.0) += 1.0;
    }
    freq
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, w)| b.get(term).map(|v| w * v))
        .sum();
    let norm_a: f64 = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Fraction of distinct query terms present in the chunk.
fn keyword_overlap(query: &HashMap<String, f64>, doc: &HashMap<String, f64>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let matched = query.keys().filter(|term| doc.contains_key(*term)).count();
    matched as f64 / query.len() as f64
}
