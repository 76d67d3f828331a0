//! Tasks: units of work with a capability-matched lifecycle.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AgentCapability;

/// Metadata key under which a task's required capabilities are recorded as
/// string tags for downstream inspection.
pub const REQUIRED_CAPABILITIES_KEY: &str = "required_capabilities";

/// Metadata key selecting the task-kind handler (and the workflow).
pub const TASK_TYPE_KEY: &str = "task_type";

/// Task lifecycle states. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Allowed: pending→assigned, assigned→in_progress,
    /// in_progress→{completed, failed}, pending→failed, assigned→failed.
    /// A terminal status never transitions again.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Pending, Failed)
                | (Assigned, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(tag)
    }
}

/// A unit of work tracked by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    pub creator_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Larger is higher. Stored for schedulers; the fabric itself does not
    /// preempt on priority.
    pub priority: i32,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Populated when the task reaches a terminal status.
    #[serde(default)]
    pub result: BTreeMap<String, Value>,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        creator_id: impl Into<String>,
        priority: i32,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            creator_id: creator_id.into(),
            status: TaskStatus::Pending,
            assigned_agent_id: None,
            created_at: Utc::now(),
            deadline: None,
            priority,
            metadata,
            result: BTreeMap::new(),
        }
    }

    /// The capability tags recorded in metadata at creation time.
    pub fn required_capability_tags(&self) -> Vec<String> {
        self.metadata
            .get(REQUIRED_CAPABILITIES_KEY)
            .and_then(|v| v.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The task-kind tag, defaulting to "qa".
    pub fn task_type(&self) -> String {
        self.metadata
            .get(TASK_TYPE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("qa")
            .to_string()
    }

    /// Record the capability requirements as string tags in metadata.
    pub fn record_required_capabilities(&mut self, capabilities: &[AgentCapability]) {
        let tags: Vec<Value> = capabilities
            .iter()
            .map(|c| Value::String(c.as_str().to_string()))
            .collect();
        self.metadata
            .insert(REQUIRED_CAPABILITIES_KEY.to_string(), Value::Array(tags));
    }
}
