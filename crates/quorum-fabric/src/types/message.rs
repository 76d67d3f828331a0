//! Messages exchanged between agents, the controller, and the bus.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::TaskStatus;
use super::AgentCapability;

/// Reserved receiver id addressing the controller.
pub const CONTROLLER_ID: &str = "controller";

/// Reserved receiver id that fans a message out to every direct subscriber.
pub const BROADCAST_ID: &str = "broadcast";

/// The closed set of message kinds. Derived from the payload — a message's
/// kind and payload can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    TaskRequest,
    TaskAssignment,
    TaskUpdate,
    TaskResult,
    AgentRegistration,
    AgentStatus,
    SystemNotification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            MessageKind::TaskRequest => "task_request",
            MessageKind::TaskAssignment => "task_assignment",
            MessageKind::TaskUpdate => "task_update",
            MessageKind::TaskResult => "task_result",
            MessageKind::AgentRegistration => "agent_registration",
            MessageKind::AgentStatus => "agent_status",
            MessageKind::SystemNotification => "system_notification",
        };
        f.write_str(tag)
    }
}

/// Lifecycle signals carried by a system notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemSignal {
    Shutdown,
    Pause,
    Resume,
}

/// Typed message content, one variant per [`MessageKind`]. Variants carry a
/// permissive `extra` map for forward compatibility where callers attach
/// free-form data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MessagePayload {
    TaskRequest {
        description: String,
        required_capabilities: Vec<AgentCapability>,
        #[serde(default)]
        extra: BTreeMap<String, Value>,
    },
    TaskAssignment {
        task_id: String,
        description: String,
        #[serde(default)]
        metadata: BTreeMap<String, Value>,
    },
    TaskUpdate {
        task_id: String,
        status: TaskStatus,
        #[serde(default)]
        extra: BTreeMap<String, Value>,
    },
    TaskResult {
        task_id: String,
        status: TaskStatus,
        #[serde(default)]
        result: BTreeMap<String, Value>,
    },
    AgentRegistration {
        agent_id: String,
        name: String,
        capabilities: Vec<AgentCapability>,
    },
    AgentStatus {
        agent_id: String,
        status: super::AgentState,
    },
    SystemNotification {
        signal: SystemSignal,
        #[serde(default)]
        extra: BTreeMap<String, Value>,
    },
}

impl MessagePayload {
    /// The kind this payload belongs to.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::TaskRequest { .. } => MessageKind::TaskRequest,
            MessagePayload::TaskAssignment { .. } => MessageKind::TaskAssignment,
            MessagePayload::TaskUpdate { .. } => MessageKind::TaskUpdate,
            MessagePayload::TaskResult { .. } => MessageKind::TaskResult,
            MessagePayload::AgentRegistration { .. } => MessageKind::AgentRegistration,
            MessagePayload::AgentStatus { .. } => MessageKind::AgentStatus,
            MessagePayload::SystemNotification { .. } => MessageKind::SystemNotification,
        }
    }
}

/// A message between participants. Immutable after publication — the bus
/// and history work on clones, and there are no mutators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub payload: MessagePayload,
    /// When set, the bus additionally fans the message out to the direct
    /// subscribers of every agent subscribed to this topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh unique id.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            payload,
            topic: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a topic for topic-based fan-out.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver_id == BROADCAST_ID
    }
}
