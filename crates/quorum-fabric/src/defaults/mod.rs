//! In-memory default implementations of the collaborator contracts.
//!
//! Production deployments swap these for real backends (a Kafka-style log,
//! a vector database, an LLM provider); tests and embedded use run on the
//! defaults directly.

mod in_memory_log_sink;
mod in_memory_vector_store;
mod llm;

pub use in_memory_log_sink::{InMemoryLogSink, SinkRecord};
pub use in_memory_vector_store::InMemoryVectorStore;
pub use llm::{EchoLlm, ScriptedLlm};
