//! Data model: closed vocabularies and the Message / Task / Agent entities.

mod agent;
mod message;
mod task;

pub use agent::{AgentDescriptor, AgentState};
pub use message::{
    Message, MessageKind, MessagePayload, SystemSignal, BROADCAST_ID, CONTROLLER_ID,
};
pub use task::{Task, TaskStatus, REQUIRED_CAPABILITIES_KEY, TASK_TYPE_KEY};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A kind of work an agent can perform. Closed vocabulary; routing and
/// task matching are keyed on these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    TextProcessing,
    ImageProcessing,
    AudioProcessing,
    CodeGeneration,
    DataAnalysis,
    Reasoning,
}

impl AgentCapability {
    /// The wire tag for this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCapability::TextProcessing => "text_processing",
            AgentCapability::ImageProcessing => "image_processing",
            AgentCapability::AudioProcessing => "audio_processing",
            AgentCapability::CodeGeneration => "code_generation",
            AgentCapability::DataAnalysis => "data_analysis",
            AgentCapability::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_processing" => Ok(AgentCapability::TextProcessing),
            "image_processing" => Ok(AgentCapability::ImageProcessing),
            "audio_processing" => Ok(AgentCapability::AudioProcessing),
            "code_generation" => Ok(AgentCapability::CodeGeneration),
            "data_analysis" => Ok(AgentCapability::DataAnalysis),
            "reasoning" => Ok(AgentCapability::Reasoning),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}
