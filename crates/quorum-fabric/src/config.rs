//! Configuration for the fabric's subsystems.
//!
//! All structs deserialize with defaulted fields, so a partial document
//! (or none at all) yields a working configuration. File loading is the
//! embedding application's concern.

use serde::{Deserialize, Serialize};

/// Message bus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Total delivery-queue capacity, split across the workers.
    pub queue_size: usize,
    /// Number of dispatch workers.
    pub workers: usize,
    /// External log topic every published message is forwarded to.
    pub message_topic: String,
    /// Stream topic for system notifications.
    pub system_topic: String,
    /// Stream topic for task lifecycle messages.
    pub task_topic: String,
    /// Stream topic for agent registration/status messages.
    pub agent_topic: String,
    /// Grace period for draining in-flight handlers on shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            workers: 4,
            message_topic: "mcp-messages".into(),
            system_topic: "system-events".into(),
            task_topic: "task-events".into(),
            agent_topic: "agent-events".into(),
            shutdown_grace_ms: 5000,
        }
    }
}

/// Controller tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Advisory retention horizon surfaced in system status. The in-memory
    /// registries live for the process lifetime; no reaper runs.
    pub task_retention_days: u32,
    /// Advisory ceiling on concurrently active (non-terminal) tasks;
    /// exceeding it logs a warning.
    pub max_active_tasks: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            task_retention_days: 7,
            max_active_tasks: 1000,
        }
    }
}

/// Retrieval defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub top_k: usize,
    /// Hybrid-search weight: 0 = pure vector, 1 = pure keyword.
    pub alpha: f64,
    pub use_hybrid_search: bool,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            alpha: 0.5,
            use_hybrid_search: true,
        }
    }
}

/// Document chunking defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Per-type defaults for the text agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextAgentConfig {
    pub rag_k: usize,
    pub use_hybrid_search: bool,
    /// Answers shorter than this trigger a refinement pass in the QA flow.
    pub min_answer_len: usize,
    /// Ceiling on refinement loop iterations in the QA workflow.
    pub max_refinements: u32,
}

impl Default for TextAgentConfig {
    fn default() -> Self {
        Self {
            rag_k: 5,
            use_hybrid_search: true,
            min_answer_len: 50,
            max_refinements: 2,
        }
    }
}

/// Roll-up of every subsystem's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub bus: BusConfig,
    pub controller: ControllerConfig,
    pub retriever: RetrieverConfig,
    pub chunker: ChunkerConfig,
    pub text_agent: TextAgentConfig,
}
