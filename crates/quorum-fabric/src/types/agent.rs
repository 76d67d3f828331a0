//! Agent descriptors as tracked by the controller registry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AgentCapability;

/// Local lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Active,
    Paused,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            AgentState::Active => "active",
            AgentState::Paused => "paused",
            AgentState::ShuttingDown => "shutting_down",
            AgentState::Terminated => "terminated",
        };
        f.write_str(tag)
    }
}

/// Registry entry for a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub agent_id: String,
    pub name: String,
    pub capabilities: BTreeSet<AgentCapability>,
    pub status: AgentState,
    pub registered_at: DateTime<Utc>,
    /// Time of the last controller-observed message from this agent.
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl AgentDescriptor {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        capabilities: BTreeSet<AgentCapability>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            capabilities,
            status: AgentState::Active,
            registered_at: now,
            last_active: now,
            metadata,
        }
    }

    /// Superset match: whether this agent can satisfy every required tag.
    pub fn has_all(&self, required: &BTreeSet<AgentCapability>) -> bool {
        required.is_subset(&self.capabilities)
    }
}
