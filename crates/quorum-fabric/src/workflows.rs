//! Prebuilt multi-agent workflows over the graph engine.
//!
//! The orchestrator owns the agent handles and composes
//! [`WorkflowGraph`]s whose nodes invoke agents by capability: a QA flow
//! with a bounded answer-refinement loop, and a linear document-processing
//! flow. Tasks are routed to a workflow by their `task_type` metadata tag.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::AgentRuntime;
use crate::config::TextAgentConfig;
use crate::controller::Controller;
use crate::errors::{NodeError, WorkflowError};
use crate::graph::{FnNode, GraphNode, WorkflowGraph, WorkflowState};
use crate::types::AgentCapability;

/// Builds and runs workflows against the controller's task registry.
pub struct WorkflowOrchestrator {
    controller: Arc<Controller>,
    agents: Vec<Arc<AgentRuntime>>,
    config: TextAgentConfig,
}

impl WorkflowOrchestrator {
    pub fn new(
        controller: Arc<Controller>,
        agents: Vec<Arc<AgentRuntime>>,
        config: TextAgentConfig,
    ) -> Self {
        tracing::info!(agents = agents.len(), "workflow orchestrator initialized");
        Self {
            controller,
            agents,
            config,
        }
    }

    /// First agent (in insertion order) holding the capability.
    pub fn find_agent_by_capability(
        &self,
        capability: AgentCapability,
    ) -> Option<Arc<AgentRuntime>> {
        self.agents
            .iter()
            .find(|a| a.capabilities().contains(&capability))
            .cloned()
    }

    /// Question answering: analyze → retrieve → generate → check, with a
    /// refinement loop back into generation while the check finds the
    /// answer lacking (bounded by `max_refinements`).
    pub fn qa_workflow(&self) -> Result<WorkflowGraph, WorkflowError> {
        let agent = self.find_agent_by_capability(AgentCapability::TextProcessing);
        let mut graph = WorkflowGraph::new();

        graph.add_node(
            "start",
            FnNode::new(|state: &WorkflowState| {
                tracing::info!(task_id = ?state.get_str("task_id"), "qa workflow started");
                Ok(json!({ "status": "initialized" }))
            }),
        );
        graph.add_node(
            "analyze_query",
            AnalyzeQueryNode {
                agent: agent.clone(),
            },
        );
        graph.add_node(
            "retrieve_information",
            RetrieveNode {
                agent: agent.clone(),
            },
        );
        graph.add_node(
            "generate_answer",
            GenerateAnswerNode {
                agent: agent.clone(),
            },
        );
        graph.add_node(
            "check_answer",
            CheckAnswerNode {
                config: self.config.clone(),
            },
        );
        graph.add_node("refine_answer", RefineAnswerNode);
        graph.add_node("format_response", FormatResponseNode);
        graph.add_node(
            "end",
            FnNode::new(|state: &WorkflowState| {
                let mut response = state
                    .get("final_response")
                    .and_then(|v| v.as_object().cloned())
                    .unwrap_or_default();
                response.insert("workflow_completed".to_string(), json!(true));
                Ok(Value::Object(response))
            }),
        );

        graph.set_entry_point("start")?;
        graph.add_terminal("end")?;
        graph.add_edge("start", "analyze_query")?;
        graph.add_edge("analyze_query", "retrieve_information")?;
        graph.add_edge("retrieve_information", "generate_answer")?;
        graph.add_edge("generate_answer", "check_answer")?;
        graph.add_conditional_edge("check_answer", "refine_answer", |s| {
            s.get_bool("needs_refinement", false)
        })?;
        graph.add_conditional_edge("check_answer", "format_response", |s| {
            !s.get_bool("needs_refinement", false)
        })?;
        graph.add_edge("refine_answer", "generate_answer")?;
        graph.add_edge("format_response", "end")?;

        Ok(graph)
    }

    /// Linear document pipeline: preprocess → analyze → extract →
    /// summarize → classify.
    pub fn document_workflow(&self) -> Result<WorkflowGraph, WorkflowError> {
        let agent = self.find_agent_by_capability(AgentCapability::TextProcessing);
        let mut graph = WorkflowGraph::new();

        graph.add_node(
            "start",
            FnNode::new(|state: &WorkflowState| {
                let text = state.get_str("description").unwrap_or_default();
                state.set("document_text", json!(text));
                Ok(json!({ "status": "initialized" }))
            }),
        );
        graph.add_node(
            "preprocess_document",
            FnNode::new(|state: &WorkflowState| {
                let text = state.get_str("document_text").unwrap_or_default();
                let cleaned = normalize_whitespace(&text);
                state.set("document_text", json!(cleaned));
                Ok(json!({ "status": "completed" }))
            }),
        );
        graph.add_node(
            "analyze_document",
            DocumentStepNode {
                agent: agent.clone(),
                analysis_type: "key_points",
                state_key: "document_analysis",
            },
        );
        graph.add_node(
            "extract_information",
            DocumentStepNode {
                agent: agent.clone(),
                analysis_type: "entity",
                state_key: "extracted_entities",
            },
        );
        graph.add_node(
            "generate_summary",
            SummarizeDocumentNode {
                agent: agent.clone(),
            },
        );
        graph.add_node(
            "classify_document",
            DocumentStepNode {
                agent,
                analysis_type: "classification",
                state_key: "document_category",
            },
        );
        graph.add_node(
            "end",
            FnNode::new(|state: &WorkflowState| {
                Ok(json!({
                    "summary": state.get_or("summary", json!("")),
                    "analysis": state.get_or("document_analysis", json!({})),
                    "entities": state.get_or("extracted_entities", json!({})),
                    "category": state.get_or("document_category", json!({})),
                    "workflow_completed": true,
                }))
            }),
        );

        graph.set_entry_point("start")?;
        graph.add_terminal("end")?;
        graph.add_edge("start", "preprocess_document")?;
        graph.add_edge("preprocess_document", "analyze_document")?;
        graph.add_edge("analyze_document", "extract_information")?;
        graph.add_edge("extract_information", "generate_summary")?;
        graph.add_edge("generate_summary", "classify_document")?;
        graph.add_edge("classify_document", "end")?;

        Ok(graph)
    }

    /// Run the workflow matching a task's `task_type` tag and return the
    /// terminal output.
    pub async fn execute_task(
        &self,
        task_id: &str,
    ) -> Result<BTreeMap<String, Value>, WorkflowError> {
        let task = self
            .controller
            .get_task(task_id)
            .ok_or_else(|| WorkflowError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        let task_type = task.task_type();
        let graph = match task_type.as_str() {
            "qa" => self.qa_workflow()?,
            "document_processing" => self.document_workflow()?,
            other => {
                return Err(WorkflowError::UnsupportedTaskType {
                    task_type: other.to_string(),
                })
            }
        };

        let state = WorkflowState::new();
        state.set("task_id", json!(task_id));
        state.set("description", json!(task.description));
        state.set("task_type", json!(task_type));

        let result = graph.execute(&state).await?;
        if !result.success {
            tracing::error!(
                task_id,
                path = ?result.execution_path,
                "workflow execution failed"
            );
            return Err(WorkflowError::Execution {
                path: result.execution_path,
                message: result.error_message.unwrap_or_default(),
            });
        }

        tracing::info!(
            task_id,
            path = %result.execution_path.join(" -> "),
            "workflow executed"
        );
        Ok(match result.last_output() {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Some(other) => BTreeMap::from([("output".to_string(), other.clone())]),
            None => BTreeMap::new(),
        })
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn require_agent(agent: &Option<Arc<AgentRuntime>>) -> Result<&Arc<AgentRuntime>, NodeError> {
    agent
        .as_ref()
        .ok_or_else(|| NodeError::new("no text processing agent available"))
}

// ---------------------------------------------------------------------------
// QA nodes
// ---------------------------------------------------------------------------

struct AnalyzeQueryNode {
    agent: Option<Arc<AgentRuntime>>,
}

#[async_trait]
impl GraphNode for AnalyzeQueryNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let agent = require_agent(&self.agent)?;
        let query = state.get_str("description").unwrap_or_default();
        let result = agent
            .execute_direct(
                "text_analysis",
                &query,
                BTreeMap::from([
                    ("text".to_string(), json!(query)),
                    ("analysis_type".to_string(), json!("entity")),
                ]),
            )
            .await?;
        state.set(
            "query_analysis",
            Value::Object(result.into_iter().collect()),
        );
        Ok(json!({ "status": "completed" }))
    }
}

struct RetrieveNode {
    agent: Option<Arc<AgentRuntime>>,
}

#[async_trait]
impl GraphNode for RetrieveNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let agent = require_agent(&self.agent)?;
        let query = state.get_str("description").unwrap_or_default();
        let result = agent
            .execute_direct("retrieval", &query, BTreeMap::new())
            .await?;

        let context = result.get("context").cloned().unwrap_or(json!(""));
        let sources = result.get("sources").cloned().unwrap_or(json!([]));
        let count = result.get("count").cloned().unwrap_or(json!(0));
        state.set("retrieval_context", context);
        state.set("sources", sources);
        Ok(json!({ "status": "completed", "sources_count": count }))
    }
}

struct GenerateAnswerNode {
    agent: Option<Arc<AgentRuntime>>,
}

#[async_trait]
impl GraphNode for GenerateAnswerNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let agent = require_agent(&self.agent)?;
        let query = state.get_str("description").unwrap_or_default();

        let mut params = BTreeMap::from([(
            "context".to_string(),
            state.get_or("retrieval_context", json!("")),
        )]);
        if let Some(suggestions) = state.get_str("improvement_suggestions") {
            params.insert("improvement_suggestions".to_string(), json!(suggestions));
        }

        let result = agent.execute_direct("qa", &query, params).await?;
        let answer = result.get("answer").cloned().unwrap_or(json!(""));
        state.set("answer", answer.clone());
        Ok(json!({ "status": "completed", "answer": answer }))
    }
}

struct CheckAnswerNode {
    config: TextAgentConfig,
}

#[async_trait]
impl GraphNode for CheckAnswerNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let answer = state.get_str("answer").unwrap_or_default();
        let has_sources = state
            .get("sources")
            .and_then(|v| v.as_array().map(|a| !a.is_empty()))
            .unwrap_or(false);

        let too_short = answer.chars().count() < self.config.min_answer_len;
        let uncited = has_sources && !answer.contains('[');
        let refinements = state.get_u64("refinement_count", 0);
        let under_cap = refinements < u64::from(self.config.max_refinements);
        let needs_refinement = (too_short || uncited) && under_cap;

        if needs_refinement {
            let mut suggestions = String::new();
            if too_short {
                suggestions.push_str("The answer is too short; expand the explanation. ");
            }
            if uncited {
                suggestions.push_str("Cite the retrieved sources with bracketed indices.");
            }
            state.set("improvement_suggestions", json!(suggestions.trim()));
        }
        state.set("needs_refinement", json!(needs_refinement));

        Ok(json!({
            "status": "completed",
            "needs_refinement": needs_refinement,
        }))
    }
}

struct RefineAnswerNode;

#[async_trait]
impl GraphNode for RefineAnswerNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let count = state.get_u64("refinement_count", 0) + 1;
        state.set("refinement_count", json!(count));
        tracing::info!(refinement = count, "refining answer");
        Ok(json!({ "status": "completed", "refinement_count": count }))
    }
}

struct FormatResponseNode;

#[async_trait]
impl GraphNode for FormatResponseNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let response = json!({
            "answer": state.get_or("answer", json!("")),
            "sources": state.get_or("sources", json!([])),
        });
        state.set("final_response", response.clone());
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Document nodes
// ---------------------------------------------------------------------------

struct DocumentStepNode {
    agent: Option<Arc<AgentRuntime>>,
    analysis_type: &'static str,
    state_key: &'static str,
}

#[async_trait]
impl GraphNode for DocumentStepNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let agent = require_agent(&self.agent)?;
        let text = state.get_str("document_text").unwrap_or_default();
        let result = agent
            .execute_direct(
                "text_analysis",
                &text,
                BTreeMap::from([
                    ("text".to_string(), json!(text)),
                    ("analysis_type".to_string(), json!(self.analysis_type)),
                ]),
            )
            .await?;
        state.set(
            self.state_key,
            result.get("result").cloned().unwrap_or(json!({})),
        );
        Ok(json!({ "status": "completed" }))
    }
}

struct SummarizeDocumentNode {
    agent: Option<Arc<AgentRuntime>>,
}

#[async_trait]
impl GraphNode for SummarizeDocumentNode {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        let agent = require_agent(&self.agent)?;
        let text = state.get_str("document_text").unwrap_or_default();
        let result = agent
            .execute_direct(
                "summarization",
                &text,
                BTreeMap::from([("text".to_string(), json!(text))]),
            )
            .await?;
        let summary = result.get("summary").cloned().unwrap_or(json!(""));
        state.set("summary", summary.clone());
        Ok(json!({ "status": "completed", "summary": summary }))
    }
}
