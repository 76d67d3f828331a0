//! Agent runtime: the shared machinery every agent runs on.
//!
//! An agent is a capability-tagged participant. The runtime registers it
//! with the controller, subscribes it on the bus, reacts to task
//! assignments by driving the task lifecycle around the injected
//! [`TaskExecutor`], and obeys system notifications. Domain behavior lives
//! entirely in the executor.

mod text;

pub use text::{TaskHandler, TaskRouter, TextAgent};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use crate::bus::MessageBus;
use crate::errors::{HandlerError, TaskError};
use crate::traits::{ControlPlane, MessageHandler};
use crate::types::{
    AgentCapability, AgentState, Message, MessageKind, MessagePayload, SystemSignal, TaskStatus,
    TASK_TYPE_KEY,
};

/// The work handed to an executor: the assignment message's content.
#[derive(Debug, Clone)]
pub struct AssignedTask {
    pub task_id: String,
    pub description: String,
    pub metadata: BTreeMap<String, Value>,
}

/// Runtime facilities an executor may use while running a task.
#[derive(Clone)]
pub struct AgentContext {
    pub agent_id: String,
    pub name: String,
    pub control: Arc<dyn ControlPlane>,
}

/// The one abstract operation an agent implementation provides.
///
/// Must be synchronous relative to the caller: the runtime awaits the
/// returned future before reporting a terminal status.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute_task(
        &self,
        task: &AssignedTask,
        ctx: &AgentContext,
    ) -> Result<BTreeMap<String, Value>, TaskError>;
}

/// Shared runtime wrapped around a [`TaskExecutor`].
pub struct AgentRuntime {
    agent_id: String,
    name: String,
    capabilities: BTreeSet<AgentCapability>,
    control: Arc<dyn ControlPlane>,
    executor: Arc<dyn TaskExecutor>,
    bus: Arc<MessageBus>,
    state: RwLock<AgentState>,
    current_task: Mutex<Option<String>>,
    extra_handlers: RwLock<HashMap<MessageKind, Vec<Arc<dyn MessageHandler>>>>,
}

impl AgentRuntime {
    /// Start an agent with a generated id.
    pub async fn start(
        name: impl Into<String>,
        capabilities: BTreeSet<AgentCapability>,
        control: Arc<dyn ControlPlane>,
        executor: Arc<dyn TaskExecutor>,
        bus: Arc<MessageBus>,
    ) -> Arc<Self> {
        Self::start_with_id(
            uuid::Uuid::new_v4().to_string(),
            name,
            capabilities,
            BTreeMap::new(),
            control,
            executor,
            bus,
        )
        .await
    }

    /// Start an agent under a caller-chosen id. Registers with the
    /// controller and subscribes on the bus; the agent stays paused when
    /// registration is refused (duplicate id).
    pub async fn start_with_id(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        capabilities: BTreeSet<AgentCapability>,
        metadata: BTreeMap<String, Value>,
        control: Arc<dyn ControlPlane>,
        executor: Arc<dyn TaskExecutor>,
        bus: Arc<MessageBus>,
    ) -> Arc<Self> {
        let agent_id = agent_id.into();
        let name = name.into();
        let runtime = Arc::new(Self {
            agent_id: agent_id.clone(),
            name: name.clone(),
            capabilities: capabilities.clone(),
            control: Arc::clone(&control),
            executor,
            bus: Arc::clone(&bus),
            state: RwLock::new(AgentState::Paused),
            current_task: Mutex::new(None),
            extra_handlers: RwLock::new(HashMap::new()),
        });

        let registered = control
            .register_agent(&agent_id, &name, capabilities, metadata)
            .await;
        if registered {
            *runtime.state.write() = AgentState::Active;
            bus.subscribe(&agent_id, runtime.clone() as Arc<dyn MessageHandler>);
            tracing::info!(agent_id = %agent_id, name = %name, "agent registered and active");
        } else {
            // A refused agent must not shadow the id's current holder on
            // the bus.
            tracing::warn!(agent_id = %agent_id, name = %name, "agent registration refused");
        }
        runtime
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &BTreeSet<AgentCapability> {
        &self.capabilities
    }

    pub fn state(&self) -> AgentState {
        *self.state.read()
    }

    pub fn current_task(&self) -> Option<String> {
        self.current_task.lock().clone()
    }

    /// Add a handler invoked after the built-in handling for a kind.
    pub fn register_message_handler(&self, kind: MessageKind, handler: Arc<dyn MessageHandler>) {
        self.extra_handlers
            .write()
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Send a message through the controller on this agent's behalf.
    pub async fn send_message(&self, receiver_id: &str, payload: MessagePayload) -> String {
        self.control
            .send_message(&self.agent_id, receiver_id, payload)
            .await
    }

    /// Create a task through the controller with this agent as creator.
    pub async fn create_task(
        &self,
        description: &str,
        required_capabilities: BTreeSet<AgentCapability>,
        priority: i32,
        metadata: BTreeMap<String, Value>,
    ) -> String {
        self.control
            .create_task(
                description,
                &self.agent_id,
                required_capabilities,
                priority,
                None,
                metadata,
            )
            .await
    }

    /// Invoke the executor directly, outside the controller's task
    /// lifecycle. Workflow nodes call agents this way.
    pub async fn execute_direct(
        &self,
        task_type: &str,
        description: &str,
        params: BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, TaskError> {
        let mut metadata = params;
        metadata.insert(TASK_TYPE_KEY.to_string(), json!(task_type));
        let task = AssignedTask {
            task_id: format!("direct-{}", uuid::Uuid::new_v4()),
            description: description.to_string(),
            metadata,
        };
        let ctx = self.context();
        self.executor.execute_task(&task, &ctx).await
    }

    fn context(&self) -> AgentContext {
        AgentContext {
            agent_id: self.agent_id.clone(),
            name: self.name.clone(),
            control: Arc::clone(&self.control),
        }
    }

    async fn process_message(&self, message: Message) {
        if message.receiver_id != self.agent_id && !message.is_broadcast() {
            tracing::warn!(
                agent_id = %self.agent_id,
                receiver_id = %message.receiver_id,
                message_id = %message.message_id,
                "dropping message intended for another agent"
            );
            return;
        }

        match &message.payload {
            MessagePayload::TaskAssignment {
                task_id,
                description,
                metadata,
            } => {
                let task = AssignedTask {
                    task_id: task_id.clone(),
                    description: description.clone(),
                    metadata: metadata.clone(),
                };
                self.handle_task_assignment(task).await;
            }
            MessagePayload::SystemNotification { signal, .. } => {
                self.handle_system_notification(*signal).await;
            }
            _ => {
                tracing::debug!(
                    agent_id = %self.agent_id,
                    kind = %message.kind(),
                    "no built-in handling for message kind"
                );
            }
        }

        let extras: Vec<Arc<dyn MessageHandler>> = self
            .extra_handlers
            .read()
            .get(&message.kind())
            .cloned()
            .unwrap_or_default();
        for handler in extras {
            if let Err(e) = handler.handle(message.clone()).await {
                tracing::error!(
                    agent_id = %self.agent_id,
                    message_id = %message.message_id,
                    error = %e,
                    "agent message handler failed"
                );
            }
        }
    }

    async fn handle_task_assignment(&self, task: AssignedTask) {
        tracing::info!(
            agent_id = %self.agent_id,
            task_id = %task.task_id,
            "received task assignment"
        );
        *self.current_task.lock() = Some(task.task_id.clone());

        self.control
            .update_task_status(&task.task_id, TaskStatus::InProgress, None)
            .await;

        let ctx = self.context();
        match self.executor.execute_task(&task, &ctx).await {
            Ok(result) => {
                self.control
                    .update_task_status(&task.task_id, TaskStatus::Completed, Some(result))
                    .await;
                tracing::info!(
                    agent_id = %self.agent_id,
                    task_id = %task.task_id,
                    "task completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    agent_id = %self.agent_id,
                    task_id = %task.task_id,
                    error = %e,
                    "task execution failed"
                );
                let result = BTreeMap::from([("error".to_string(), json!(e.to_string()))]);
                self.control
                    .update_task_status(&task.task_id, TaskStatus::Failed, Some(result))
                    .await;
            }
        }

        *self.current_task.lock() = None;
    }

    async fn handle_system_notification(&self, signal: SystemSignal) {
        tracing::info!(agent_id = %self.agent_id, ?signal, "received system notification");
        match signal {
            SystemSignal::Shutdown => {
                *self.state.write() = AgentState::ShuttingDown;
                self.control.unregister_agent(&self.agent_id).await;
                self.bus.unsubscribe(&self.agent_id, None);
                *self.state.write() = AgentState::Terminated;
            }
            SystemSignal::Pause => {
                *self.state.write() = AgentState::Paused;
            }
            SystemSignal::Resume => {
                *self.state.write() = AgentState::Active;
            }
        }
    }
}

#[async_trait]
impl MessageHandler for AgentRuntime {
    async fn handle(&self, message: Message) -> Result<(), HandlerError> {
        self.process_message(message).await;
        Ok(())
    }
}
