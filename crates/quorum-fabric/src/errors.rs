//! Error types for all fabric trait operations.

use thiserror::Error;

/// Errors from in-process [`MessageHandler`](super::traits::MessageHandler)s.
///
/// Handler failures are caught at the invocation boundary, logged with the
/// offending message id, and never abort the other handlers of a message.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler error: {message}")]
    Handler { message: String },
}

impl HandlerError {
    /// Shorthand used by handler implementations.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

/// Errors from the external [`LogSink`](super::traits::LogSink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("log sink error: {message}")]
    Sink { message: String },
}

/// Errors from [`VectorStore`](super::traits::VectorStore) and the
/// retrieval layer built on top of it.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("document/metadata length mismatch: {documents} documents, {metadatas} metadatas")]
    LengthMismatch { documents: usize, metadatas: usize },
    #[error("vector store error: {message}")]
    Store { message: String },
}

/// Errors from the [`LlmService`](super::traits::LlmService) collaborator.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm service error: {message}")]
    Generation { message: String },
}

/// Errors from an agent's task execution path.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unsupported task type: {task_type}")]
    UnsupportedType { task_type: String },
    #[error("missing required task field: {field}")]
    MissingField { field: String },
    #[error("task execution error: {message}")]
    Execution { message: String },
}

impl From<LlmError> for TaskError {
    fn from(e: LlmError) -> Self {
        TaskError::Execution {
            message: e.to_string(),
        }
    }
}

/// Construction-time errors on a [`WorkflowGraph`](super::graph::WorkflowGraph).
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node not found: {name}")]
    NodeNotFound { name: String },
    #[error("entry point not set")]
    NoEntryPoint,
}

/// Errors thrown by a graph node at execution time.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node error: {message}")]
    Execution { message: String },
}

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

impl From<TaskError> for NodeError {
    fn from(e: TaskError) -> Self {
        NodeError::Execution {
            message: e.to_string(),
        }
    }
}

/// Errors from the workflow orchestrator.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },
    #[error("unsupported task type: {task_type}")]
    UnsupportedTaskType { task_type: String },
    #[error("workflow execution failed at {path:?}: {message}")]
    Execution { path: Vec<String>, message: String },
    #[error("graph construction error: {0}")]
    Graph(#[from] GraphError),
}
