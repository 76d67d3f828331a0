//! quorum-fabric — a multi-agent coordination fabric.
//!
//! A central [`Controller`] registers capability-tagged agents, accepts
//! tasks, and routes each task to a matching agent; a [`MessageBus`]
//! delivers messages asynchronously to in-process subscribers while
//! forwarding everything to an external durable log; an [`AgentRuntime`]
//! drives the task lifecycle around pluggable executors; and a
//! [`WorkflowGraph`] sequences agent invocations with conditional edges
//! and bounded refinement loops.
//!
//! The crate is designed to be embedded: every external collaborator (log
//! sink, vector store, chunker, LLM) is an async trait with an in-memory
//! default, and nothing here depends on a server or a database.

pub mod agent;
pub mod bus;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod errors;
pub mod graph;
pub mod retrieval;
pub mod traits;
pub mod types;
pub mod workflows;

// Re-export public types at the crate level.

// agent
pub use agent::{
    AgentContext, AgentRuntime, AssignedTask, TaskExecutor, TaskHandler, TaskRouter, TextAgent,
};

// bus
pub use bus::{MessageBus, QueueStatus};

// config
pub use config::{
    BusConfig, ChunkerConfig, ControllerConfig, FabricConfig, RetrieverConfig, TextAgentConfig,
};

// controller
pub use controller::{Controller, SystemStatus};

// defaults
pub use defaults::{EchoLlm, InMemoryLogSink, InMemoryVectorStore, ScriptedLlm, SinkRecord};

// errors
pub use errors::{
    GraphError, HandlerError, LlmError, NodeError, RetrievalError, SinkError, TaskError,
    WorkflowError,
};

// graph
pub use graph::{FnNode, GraphNode, GraphResult, WorkflowGraph, WorkflowState};

// retrieval
pub use retrieval::{BoundaryChunker, Retriever, DOCUMENT_ID_KEY};

// traits
pub use traits::{
    ControlPlane, DocumentChunker, LlmService, LogSink, MessageHandler, SearchResult, VectorStore,
};

// types
pub use types::{
    AgentCapability, AgentDescriptor, AgentState, Message, MessageKind, MessagePayload,
    SystemSignal, Task, TaskStatus, BROADCAST_ID, CONTROLLER_ID, REQUIRED_CAPABILITIES_KEY,
    TASK_TYPE_KEY,
};

// workflows
pub use workflows::WorkflowOrchestrator;
