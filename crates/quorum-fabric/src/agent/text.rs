//! Text-processing agent: QA over retrieved context, summarization, and
//! text analysis, routed by task kind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{AgentContext, AssignedTask, TaskExecutor};
use crate::config::TextAgentConfig;
use crate::errors::TaskError;
use crate::retrieval::{Retriever, DOCUMENT_ID_KEY};
use crate::traits::{LlmService, SearchResult};
use crate::types::{AgentCapability, TASK_TYPE_KEY};

/// One task kind an agent knows how to run.
///
/// Handlers declare the metadata fields they need; the router validates
/// them before the handler body runs.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The `task_type` tag this handler owns.
    fn task_type(&self) -> &'static str;

    /// Metadata keys that must be present for this handler.
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(
        &self,
        task: &AssignedTask,
        ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError>;
}

/// Registry of task handlers keyed by task-kind tag.
#[derive(Default)]
pub struct TaskRouter {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers
            .insert(handler.task_type().to_string(), handler);
    }

    pub fn task_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Dispatch on the task's `task_type` tag (default "qa"), validating
    /// the handler's declared fields first.
    pub async fn route(
        &self,
        task: &AssignedTask,
        ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError> {
        let task_type = task
            .metadata
            .get(TASK_TYPE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("qa");
        let handler = self
            .handlers
            .get(task_type)
            .ok_or_else(|| TaskError::UnsupportedType {
                task_type: task_type.to_string(),
            })?;
        for field in handler.required_fields() {
            if !task.metadata.contains_key(*field) {
                return Err(TaskError::MissingField {
                    field: (*field).to_string(),
                });
            }
        }
        handler.run(task, ctx).await
    }
}

/// Text agent: RAG-backed question answering plus summarization and
/// analysis, all behind the standard executor contract.
pub struct TextAgent {
    router: TaskRouter,
}

impl TextAgent {
    pub fn new(
        retriever: Arc<Retriever>,
        llm: Arc<dyn LlmService>,
        config: TextAgentConfig,
    ) -> Self {
        let mut router = TaskRouter::new();
        router.register(Arc::new(QaHandler {
            retriever: Arc::clone(&retriever),
            llm: Arc::clone(&llm),
            config: config.clone(),
        }));
        router.register(Arc::new(RetrievalHandler {
            retriever: Arc::clone(&retriever),
            config: config.clone(),
        }));
        router.register(Arc::new(SummarizationHandler {
            retriever,
            llm: Arc::clone(&llm),
        }));
        router.register(Arc::new(AnalysisHandler { llm }));
        tracing::info!(task_types = ?router.task_types(), "text agent initialized");
        Self { router }
    }

    /// The capability tags a text agent registers under.
    pub fn capabilities() -> BTreeSet<AgentCapability> {
        [AgentCapability::TextProcessing, AgentCapability::Reasoning]
            .into_iter()
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for TextAgent {
    async fn execute_task(
        &self,
        task: &AssignedTask,
        ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError> {
        self.router.route(task, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

struct QaHandler {
    retriever: Arc<Retriever>,
    llm: Arc<dyn LlmService>,
    config: TextAgentConfig,
}

#[async_trait]
impl TaskHandler for QaHandler {
    fn task_type(&self) -> &'static str {
        "qa"
    }

    async fn run(
        &self,
        task: &AssignedTask,
        _ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError> {
        let question = task.description.as_str();
        let metadata = &task.metadata;

        // A caller (e.g. a workflow that already retrieved) may supply the
        // context directly; otherwise run retrieval here.
        let (context, sources) = match str_param(metadata, "context") {
            Some(context) => (context, Vec::new()),
            None => {
                let rag_k = usize_param(metadata, "rag_k", self.config.rag_k);
                let hybrid =
                    bool_param(metadata, "hybrid_search", self.config.use_hybrid_search);
                let filters = map_param(metadata, "filters");
                let results = self
                    .retriever
                    .query(question, rag_k, filters.as_ref(), None, hybrid, None)
                    .await;
                (build_context(&results), source_list(&results))
            }
        };

        let mut prompt = format!(
            "Answer the question using the provided context. Cite sources \
             with bracketed indices like [1].\n\nContext:\n{context}\n\nQuestion: {question}\n"
        );
        if let Some(suggestions) = str_param(metadata, "improvement_suggestions") {
            prompt.push_str(&format!("\nRevise per these suggestions: {suggestions}\n"));
        }
        prompt.push_str("\nAnswer:");

        let answer = self.llm.generate_text(&prompt).await?;
        tracing::info!(question, "qa task completed");
        Ok(BTreeMap::from([
            ("answer".to_string(), json!(answer)),
            ("sources".to_string(), Value::Array(sources)),
        ]))
    }
}

struct RetrievalHandler {
    retriever: Arc<Retriever>,
    config: TextAgentConfig,
}

#[async_trait]
impl TaskHandler for RetrievalHandler {
    fn task_type(&self) -> &'static str {
        "retrieval"
    }

    async fn run(
        &self,
        task: &AssignedTask,
        _ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError> {
        let metadata = &task.metadata;
        let query = str_param(metadata, "query").unwrap_or_else(|| task.description.clone());
        let top_k = usize_param(metadata, "top_k", self.config.rag_k);
        let hybrid = bool_param(metadata, "hybrid_search", self.config.use_hybrid_search);
        let filters = map_param(metadata, "filters");

        let results = self
            .retriever
            .query(&query, top_k, filters.as_ref(), None, hybrid, None)
            .await;
        Ok(BTreeMap::from([
            ("context".to_string(), json!(build_context(&results))),
            ("sources".to_string(), Value::Array(source_list(&results))),
            ("count".to_string(), json!(results.len())),
        ]))
    }
}

struct SummarizationHandler {
    retriever: Arc<Retriever>,
    llm: Arc<dyn LlmService>,
}

#[async_trait]
impl TaskHandler for SummarizationHandler {
    fn task_type(&self) -> &'static str {
        "summarization"
    }

    async fn run(
        &self,
        task: &AssignedTask,
        _ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError> {
        let metadata = &task.metadata;

        // Text may come inline or through a document-id lookup.
        let mut text = str_param(metadata, "text");
        if text.is_none() {
            if let Some(document_id) = str_param(metadata, DOCUMENT_ID_KEY) {
                let filter =
                    BTreeMap::from([(DOCUMENT_ID_KEY.to_string(), json!(document_id))]);
                let results = self
                    .retriever
                    .query("", 1, Some(&filter), None, false, None)
                    .await;
                text = results.first().map(|r| r.content.clone());
            }
        }
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return Err(TaskError::MissingField {
                field: "text".into(),
            });
        };

        let max_length = usize_param(metadata, "max_length", 200);
        let prompt = format!(
            "Write a concise summary of the following text in at most \
             {max_length} words:\n\n{text}\n\nSummary:"
        );
        let summary = self.llm.generate_text(&prompt).await?;
        tracing::info!(summary_len = summary.len(), "summarization task completed");
        Ok(BTreeMap::from([("summary".to_string(), json!(summary))]))
    }
}

struct AnalysisHandler {
    llm: Arc<dyn LlmService>,
}

#[async_trait]
impl TaskHandler for AnalysisHandler {
    fn task_type(&self) -> &'static str {
        "text_analysis"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["text"]
    }

    async fn run(
        &self,
        task: &AssignedTask,
        _ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError> {
        let metadata = &task.metadata;
        let text = str_param(metadata, "text").unwrap_or_default();
        let analysis_type =
            str_param(metadata, "analysis_type").unwrap_or_else(|| "sentiment".into());

        let prompt = match analysis_type.as_str() {
            "sentiment" => format!(
                "Analyze the sentiment of the following text. Return a JSON \
                 object with fields sentiment, intensity (1-5), key_words, \
                 and conclusion.\n\nText: {text}"
            ),
            "key_points" => format!(
                "Extract the most important points from the following text. \
                 Return a JSON object with a key_points array of objects \
                 carrying point and explanation fields.\n\n{text}"
            ),
            "entity" => format!(
                "Identify the significant entities (people, organizations, \
                 places, dates) in the following text. Return a JSON object \
                 with an entities array of objects carrying entity, type, \
                 and importance fields.\n\n{text}"
            ),
            "classification" => format!(
                "Classify the following document into a single category \
                 (for example technical_documentation, report, \
                 correspondence, marketing). Return a JSON object with \
                 category, confidence (0-1), and rationale fields.\n\n{text}"
            ),
            _ => format!("Analyze the following text in detail:\n\n{text}"),
        };

        let raw = self.llm.generate_text(&prompt).await?;
        let result = match serde_json::from_str::<Value>(&raw) {
            Ok(parsed) if parsed.is_object() => parsed,
            _ => json!({ "raw_result": raw }),
        };
        tracing::info!(%analysis_type, "text analysis task completed");
        Ok(BTreeMap::from([
            ("analysis_type".to_string(), json!(analysis_type)),
            ("result".to_string(), result),
        ]))
    }
}

// ---------------------------------------------------------------------------
// Param helpers
// ---------------------------------------------------------------------------

fn usize_param(params: &BTreeMap<String, Value>, key: &str, default: usize) -> usize {
    match params.get(key) {
        Some(Value::Number(n)) => n.as_u64().map(|v| v as usize).unwrap_or(default),
        Some(Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

fn bool_param(params: &BTreeMap<String, Value>, key: &str, default: bool) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

fn str_param(params: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn map_param(params: &BTreeMap<String, Value>, key: &str) -> Option<BTreeMap<String, Value>> {
    params.get(key).and_then(|v| v.as_object()).map(|obj| {
        obj.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    })
}

/// Numbered context block from retrieval hits.
fn build_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No relevant information found.".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn source_list(results: &[SearchResult]) -> Vec<Value> {
    results
        .iter()
        .map(|r| Value::Object(r.metadata.clone().into_iter().collect()))
        .collect()
}
