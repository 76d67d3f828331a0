//! Central coordinator: agent registry, task lifecycle, capability
//! routing, and in-process message handler fan-out.
//!
//! The controller offers a synchronous control surface — operations return
//! as soon as registries are updated and bus submissions are accepted. The
//! [`MessageBus`] carries the asynchronous side: assignment and result
//! notifications, and the stream topics configured on the bus.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use crate::bus::MessageBus;
use crate::config::ControllerConfig;
use crate::traits::{ControlPlane, MessageHandler};
use crate::types::{
    AgentCapability, AgentDescriptor, AgentState, Message, MessageKind, MessagePayload,
    SystemSignal, Task, TaskStatus, CONTROLLER_ID,
};

/// Registry keeping both the id index and the registration order —
/// assignment picks the first suitable agent deterministically.
#[derive(Default)]
struct AgentRegistry {
    by_id: HashMap<String, AgentDescriptor>,
    order: Vec<String>,
}

/// Aggregate counts for operators.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub agents: usize,
    pub active_agents: usize,
    pub paused_agents: usize,
    pub tasks: usize,
    pub pending_tasks: usize,
    pub assigned_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub messages: usize,
}

/// The central coordinator.
pub struct Controller {
    config: ControllerConfig,
    bus: Arc<MessageBus>,
    agents: RwLock<AgentRegistry>,
    tasks: RwLock<HashMap<String, Task>>,
    capability_routing: RwLock<HashMap<AgentCapability, Vec<String>>>,
    message_handlers: RwLock<HashMap<MessageKind, Vec<Arc<dyn MessageHandler>>>>,
    /// Guarded publish-then-append keeps history in successful-publish order.
    history: Mutex<Vec<Message>>,
}

impl Controller {
    pub fn new(config: ControllerConfig, bus: Arc<MessageBus>) -> Self {
        tracing::info!("controller initialized");
        Self {
            config,
            bus,
            agents: RwLock::new(AgentRegistry::default()),
            tasks: RwLock::new(HashMap::new()),
            capability_routing: RwLock::new(HashMap::new()),
            message_handlers: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Record, publish, and locally process a message. Returns its id.
    ///
    /// The message lands in the history iff the bus accepted it; in-process
    /// handlers run either way, in registration order, each failure logged
    /// and isolated.
    pub async fn dispatch(&self, message: Message) -> String {
        // An inbound message is the liveness signal for its sender.
        {
            let mut agents = self.agents.write();
            if let Some(agent) = agents.by_id.get_mut(&message.sender_id) {
                agent.last_active = Utc::now();
            }
        }

        let message_id = message.message_id.clone();
        {
            let mut history = self.history.lock();
            if self.bus.publish(&message) {
                history.push(message.clone());
            }
        }

        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .message_handlers
            .read()
            .get(&message.kind())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            if let Err(e) = handler.handle(message.clone()).await {
                tracing::error!(message_id = %message_id, error = %e, "message handler failed");
            }
        }

        tracing::debug!(
            message_id = %message_id,
            sender = %message.sender_id,
            receiver = %message.receiver_id,
            kind = %message.kind(),
            "message dispatched"
        );
        message_id
    }

    /// Add a handler for a message kind. Multiple handlers per kind run in
    /// registration order.
    pub fn register_message_handler(&self, kind: MessageKind, handler: Arc<dyn MessageHandler>) {
        self.message_handlers
            .write()
            .entry(kind)
            .or_default()
            .push(handler);
        tracing::debug!(%kind, "registered message handler");
    }

    /// Try to assign a pending task to the first registered agent holding
    /// every required capability.
    pub async fn assign_task(
        &self,
        task_id: &str,
        required_capabilities: &BTreeSet<AgentCapability>,
    ) -> bool {
        {
            let tasks = self.tasks.read();
            let Some(task) = tasks.get(task_id) else {
                tracing::error!(task_id, "task not found");
                return false;
            };
            if task.status != TaskStatus::Pending {
                tracing::warn!(task_id, status = %task.status, "task is not pending, not reassigning");
                return false;
            }
        }

        let selected = {
            let agents = self.agents.read();
            agents
                .order
                .iter()
                .find(|id| {
                    agents
                        .by_id
                        .get(id.as_str())
                        .is_some_and(|a| a.has_all(required_capabilities))
                })
                .cloned()
        };
        let Some(agent_id) = selected else {
            tracing::warn!(task_id, "no suitable agent found");
            return false;
        };

        let (description, metadata) = {
            let mut tasks = self.tasks.write();
            let Some(task) = tasks.get_mut(task_id) else {
                return false;
            };
            if task.status != TaskStatus::Pending {
                return false;
            }
            task.status = TaskStatus::Assigned;
            task.assigned_agent_id = Some(agent_id.clone());
            (task.description.clone(), task.metadata.clone())
        };

        let task_topic = self.bus.config().task_topic.clone();
        self.dispatch(
            Message::new(
                CONTROLLER_ID,
                agent_id.clone(),
                MessagePayload::TaskAssignment {
                    task_id: task_id.to_string(),
                    description,
                    metadata,
                },
            )
            .with_topic(task_topic),
        )
        .await;

        tracing::info!(task_id, agent_id = %agent_id, "task assigned");
        true
    }

    /// Broadcast-free lifecycle signal to one agent (or `broadcast`).
    pub async fn send_system_notification(&self, receiver_id: &str, signal: SystemSignal) -> String {
        let system_topic = self.bus.config().system_topic.clone();
        self.dispatch(
            Message::new(
                CONTROLLER_ID,
                receiver_id,
                MessagePayload::SystemNotification {
                    signal,
                    extra: BTreeMap::new(),
                },
            )
            .with_topic(system_topic),
        )
        .await
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<AgentDescriptor> {
        self.agents.read().by_id.get(agent_id).cloned()
    }

    /// Agent ids currently routable for a capability.
    pub fn get_agents_by_capability(&self, capability: AgentCapability) -> Vec<String> {
        self.capability_routing
            .read()
            .get(&capability)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().get(task_id).cloned()
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.read().get(task_id).map(|t| t.status)
    }

    pub fn message_history(&self) -> Vec<Message> {
        self.history.lock().clone()
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let agents = self.agents.read();
        let tasks = self.tasks.read();
        let count_status = |status: TaskStatus| tasks.values().filter(|t| t.status == status).count();
        SystemStatus {
            agents: agents.by_id.len(),
            active_agents: agents
                .by_id
                .values()
                .filter(|a| a.status == AgentState::Active)
                .count(),
            paused_agents: agents
                .by_id
                .values()
                .filter(|a| a.status == AgentState::Paused)
                .count(),
            tasks: tasks.len(),
            pending_tasks: count_status(TaskStatus::Pending),
            assigned_tasks: count_status(TaskStatus::Assigned),
            in_progress_tasks: count_status(TaskStatus::InProgress),
            completed_tasks: count_status(TaskStatus::Completed),
            failed_tasks: count_status(TaskStatus::Failed),
            messages: self.history.lock().len(),
        }
    }
}

#[async_trait]
impl ControlPlane for Controller {
    async fn register_agent(
        &self,
        agent_id: &str,
        name: &str,
        capabilities: BTreeSet<AgentCapability>,
        metadata: BTreeMap<String, Value>,
    ) -> bool {
        {
            let mut agents = self.agents.write();
            if agents.by_id.contains_key(agent_id) {
                tracing::warn!(agent_id, "agent already registered");
                return false;
            }
            let descriptor =
                AgentDescriptor::new(agent_id, name, capabilities.clone(), metadata);
            agents.by_id.insert(agent_id.to_string(), descriptor);
            agents.order.push(agent_id.to_string());

            let mut routing = self.capability_routing.write();
            for capability in &capabilities {
                routing
                    .entry(*capability)
                    .or_default()
                    .push(agent_id.to_string());
            }
        }
        tracing::info!(
            agent_id,
            name,
            capabilities = ?capabilities.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            "agent registered"
        );

        let agent_topic = self.bus.config().agent_topic.clone();
        self.dispatch(
            Message::new(
                CONTROLLER_ID,
                CONTROLLER_ID,
                MessagePayload::AgentRegistration {
                    agent_id: agent_id.to_string(),
                    name: name.to_string(),
                    capabilities: capabilities.into_iter().collect(),
                },
            )
            .with_topic(agent_topic),
        )
        .await;
        true
    }

    async fn unregister_agent(&self, agent_id: &str) -> bool {
        {
            let mut agents = self.agents.write();
            let Some(descriptor) = agents.by_id.remove(agent_id) else {
                tracing::warn!(agent_id, "agent not found");
                return false;
            };
            agents.order.retain(|id| id != agent_id);

            let mut routing = self.capability_routing.write();
            for capability in &descriptor.capabilities {
                if let Some(ids) = routing.get_mut(capability) {
                    ids.retain(|id| id != agent_id);
                    if ids.is_empty() {
                        routing.remove(capability);
                    }
                }
            }
            tracing::info!(agent_id, name = %descriptor.name, "agent unregistered");
        }

        let agent_topic = self.bus.config().agent_topic.clone();
        self.dispatch(
            Message::new(
                CONTROLLER_ID,
                CONTROLLER_ID,
                MessagePayload::AgentStatus {
                    agent_id: agent_id.to_string(),
                    status: AgentState::Terminated,
                },
            )
            .with_topic(agent_topic),
        )
        .await;
        true
    }

    async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        payload: MessagePayload,
    ) -> String {
        self.dispatch(Message::new(sender_id, receiver_id, payload))
            .await
    }

    async fn create_task(
        &self,
        description: &str,
        creator_id: &str,
        required_capabilities: BTreeSet<AgentCapability>,
        priority: i32,
        deadline: Option<DateTime<Utc>>,
        metadata: BTreeMap<String, Value>,
    ) -> String {
        let mut task = Task::new(description, creator_id, priority, metadata);
        task.deadline = deadline;
        let tags: Vec<AgentCapability> = required_capabilities.iter().copied().collect();
        task.record_required_capabilities(&tags);
        let task_id = task.task_id.clone();

        {
            let mut tasks = self.tasks.write();
            let active = tasks.values().filter(|t| !t.status.is_terminal()).count();
            if active >= self.config.max_active_tasks {
                tracing::warn!(
                    active,
                    max_active_tasks = self.config.max_active_tasks,
                    "active task ceiling exceeded"
                );
            }
            tasks.insert(task_id.clone(), task);
        }
        tracing::info!(task_id = %task_id, description, "task created");

        self.assign_task(&task_id, &required_capabilities).await;
        task_id
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<BTreeMap<String, Value>>,
    ) -> bool {
        let notify = {
            let mut tasks = self.tasks.write();
            let Some(task) = tasks.get_mut(task_id) else {
                tracing::error!(task_id, "task not found");
                return false;
            };
            if !task.status.can_transition_to(status) {
                tracing::warn!(
                    task_id,
                    from = %task.status,
                    to = %status,
                    "illegal task transition rejected"
                );
                return false;
            }
            task.status = status;
            if let Some(result) = result {
                task.result = result;
            }
            status
                .is_terminal()
                .then(|| (task.creator_id.clone(), task.result.clone()))
        };

        if let Some((creator_id, result)) = notify {
            let task_topic = self.bus.config().task_topic.clone();
            self.dispatch(
                Message::new(
                    CONTROLLER_ID,
                    creator_id,
                    MessagePayload::TaskResult {
                        task_id: task_id.to_string(),
                        status,
                        result,
                    },
                )
                .with_topic(task_topic),
            )
            .await;
        }

        tracing::info!(task_id, status = %status, "task status updated");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::defaults::InMemoryLogSink;
    use crate::errors::HandlerError;
    use crate::types::BROADCAST_ID;
    use serde_json::json;

    fn caps(list: &[AgentCapability]) -> BTreeSet<AgentCapability> {
        list.iter().copied().collect()
    }

    fn make_controller() -> Arc<Controller> {
        let bus = Arc::new(MessageBus::new(
            BusConfig::default(),
            Arc::new(InMemoryLogSink::new()),
        ));
        Arc::new(Controller::new(ControllerConfig::default(), bus))
    }

    async fn register_text_agent(controller: &Controller, id: &str) {
        assert!(
            controller
                .register_agent(
                    id,
                    "TextProcessor",
                    caps(&[AgentCapability::TextProcessing, AgentCapability::Reasoning]),
                    BTreeMap::new(),
                )
                .await
        );
    }

    fn assignments_to(controller: &Controller, agent_id: &str) -> Vec<Message> {
        controller
            .message_history()
            .into_iter()
            .filter(|m| m.kind() == MessageKind::TaskAssignment && m.receiver_id == agent_id)
            .collect()
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_without_state_change() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;

        let ok = controller
            .register_agent(
                "a1",
                "Imposter",
                caps(&[AgentCapability::CodeGeneration]),
                BTreeMap::new(),
            )
            .await;
        assert!(!ok);

        let descriptor = controller.get_agent("a1").unwrap();
        assert_eq!(descriptor.name, "TextProcessor");
        assert!(controller
            .get_agents_by_capability(AgentCapability::CodeGeneration)
            .is_empty());
    }

    #[tokio::test]
    async fn routing_stays_consistent_with_the_registry() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;

        assert_eq!(
            controller.get_agents_by_capability(AgentCapability::TextProcessing),
            vec!["a1"]
        );
        assert_eq!(
            controller.get_agents_by_capability(AgentCapability::Reasoning),
            vec!["a1"]
        );

        assert!(controller.unregister_agent("a1").await);
        assert!(controller.get_agent("a1").is_none());
        assert!(controller
            .get_agents_by_capability(AgentCapability::TextProcessing)
            .is_empty());
        assert!(controller
            .get_agents_by_capability(AgentCapability::Reasoning)
            .is_empty());

        // Unregistering twice fails.
        assert!(!controller.unregister_agent("a1").await);
    }

    #[tokio::test]
    async fn create_task_assigns_to_a_capable_agent() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;

        let task_id = controller
            .create_task(
                "hello",
                "u1",
                caps(&[AgentCapability::TextProcessing]),
                1,
                None,
                BTreeMap::from([("task_type".to_string(), json!("qa"))]),
            )
            .await;

        let task = controller.get_task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_agent_id.as_deref(), Some("a1"));
        assert_eq!(task.required_capability_tags(), vec!["text_processing"]);

        let assignments = assignments_to(&controller, "a1");
        assert_eq!(assignments.len(), 1);
        match &assignments[0].payload {
            MessagePayload::TaskAssignment {
                task_id: assigned_id,
                description,
                metadata,
            } => {
                assert_eq!(assigned_id, &task_id);
                assert_eq!(description, "hello");
                assert_eq!(metadata.get("task_type"), Some(&json!("qa")));
            }
            other => panic!("expected task assignment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_update_notifies_the_creator() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        let task_id = controller
            .create_task(
                "hello",
                "u1",
                caps(&[AgentCapability::TextProcessing]),
                1,
                None,
                BTreeMap::new(),
            )
            .await;

        assert!(
            controller
                .update_task_status(&task_id, TaskStatus::InProgress, None)
                .await
        );
        assert!(
            controller
                .update_task_status(
                    &task_id,
                    TaskStatus::Completed,
                    Some(BTreeMap::from([("answer".to_string(), json!("hi"))])),
                )
                .await
        );

        let task = controller.get_task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.get("answer"), Some(&json!("hi")));

        let results: Vec<Message> = controller
            .message_history()
            .into_iter()
            .filter(|m| m.kind() == MessageKind::TaskResult)
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sender_id, CONTROLLER_ID);
        assert_eq!(results[0].receiver_id, "u1");
        match &results[0].payload {
            MessagePayload::TaskResult {
                task_id: id,
                status,
                result,
            } => {
                assert_eq!(id, &task_id);
                assert_eq!(*status, TaskStatus::Completed);
                assert_eq!(result.get("answer"), Some(&json!("hi")));
            }
            other => panic!("expected task result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmatched_task_stays_pending() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;

        let task_id = controller
            .create_task(
                "write a parser",
                "u1",
                caps(&[AgentCapability::CodeGeneration]),
                1,
                None,
                BTreeMap::new(),
            )
            .await;

        assert_eq!(
            controller.get_task_status(&task_id),
            Some(TaskStatus::Pending)
        );
        let task = controller.get_task(&task_id).unwrap();
        assert!(task.assigned_agent_id.is_none());
        assert!(controller
            .message_history()
            .iter()
            .all(|m| m.kind() != MessageKind::TaskAssignment));
    }

    #[tokio::test]
    async fn empty_requirement_picks_the_first_registered_agent() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        assert!(
            controller
                .register_agent(
                    "a2",
                    "Coder",
                    caps(&[AgentCapability::CodeGeneration]),
                    BTreeMap::new(),
                )
                .await
        );

        let task_id = controller
            .create_task("anything", "u1", BTreeSet::new(), 1, None, BTreeMap::new())
            .await;

        let task = controller.get_task(&task_id).unwrap();
        assert_eq!(task.assigned_agent_id.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn assign_task_is_a_noop_on_non_pending_tasks() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        let required = caps(&[AgentCapability::TextProcessing]);
        let task_id = controller
            .create_task("hello", "u1", required.clone(), 1, None, BTreeMap::new())
            .await;
        assert_eq!(
            controller.get_task_status(&task_id),
            Some(TaskStatus::Assigned)
        );

        assert!(!controller.assign_task(&task_id, &required).await);
        assert!(!controller.assign_task("no-such-task", &required).await);
        // Still exactly one assignment message.
        assert_eq!(assignments_to(&controller, "a1").len(), 1);
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        let task_id = controller
            .create_task(
                "hello",
                "u1",
                caps(&[AgentCapability::TextProcessing]),
                1,
                None,
                BTreeMap::new(),
            )
            .await;

        controller
            .update_task_status(&task_id, TaskStatus::Failed, None)
            .await;
        assert!(
            !controller
                .update_task_status(&task_id, TaskStatus::InProgress, None)
                .await
        );
        assert!(
            !controller
                .update_task_status(&task_id, TaskStatus::Completed, None)
                .await
        );
        assert_eq!(
            controller.get_task_status(&task_id),
            Some(TaskStatus::Failed)
        );
    }

    #[tokio::test]
    async fn unregistration_leaves_assigned_tasks_in_place() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        let task_id = controller
            .create_task(
                "hello",
                "u1",
                caps(&[AgentCapability::TextProcessing]),
                1,
                None,
                BTreeMap::new(),
            )
            .await;

        controller.unregister_agent("a1").await;
        let task = controller.get_task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_agent_id.as_deref(), Some("a1"));
    }

    struct FailingHandler;

    #[async_trait]
    impl MessageHandler for FailingHandler {
        async fn handle(&self, _message: Message) -> Result<(), HandlerError> {
            Err(HandlerError::new("boom"))
        }
    }

    struct CountingHandler {
        order: Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: Message) -> Result<(), HandlerError> {
            self.order.lock().push(self.label);
            Ok(())
        }
    }

    #[tokio::test]
    async fn handler_failures_do_not_stop_later_handlers() {
        let controller = make_controller();
        let order = Arc::new(Mutex::new(Vec::new()));
        controller.register_message_handler(
            MessageKind::SystemNotification,
            Arc::new(CountingHandler {
                order: order.clone(),
                label: "first",
            }),
        );
        controller
            .register_message_handler(MessageKind::SystemNotification, Arc::new(FailingHandler));
        controller.register_message_handler(
            MessageKind::SystemNotification,
            Arc::new(CountingHandler {
                order: order.clone(),
                label: "last",
            }),
        );

        controller
            .send_system_notification(BROADCAST_ID, SystemSignal::Pause)
            .await;

        assert_eq!(*order.lock(), vec!["first", "last"]);
    }

    #[tokio::test]
    async fn history_records_only_published_messages() {
        let controller = make_controller();
        let before = controller.message_history().len();
        controller
            .send_message(
                "u1",
                "a1",
                MessagePayload::SystemNotification {
                    signal: SystemSignal::Resume,
                    extra: BTreeMap::new(),
                },
            )
            .await;
        assert_eq!(controller.message_history().len(), before + 1);

        controller.bus().shutdown().await;
        controller
            .send_message(
                "u1",
                "a1",
                MessagePayload::SystemNotification {
                    signal: SystemSignal::Resume,
                    extra: BTreeMap::new(),
                },
            )
            .await;
        // The bus rejected the publish, so the history did not grow.
        assert_eq!(controller.message_history().len(), before + 1);
    }

    #[tokio::test]
    async fn inbound_messages_refresh_last_active() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        let before = controller.get_agent("a1").unwrap().last_active;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        controller
            .send_message(
                "a1",
                CONTROLLER_ID,
                MessagePayload::TaskUpdate {
                    task_id: "t1".into(),
                    status: TaskStatus::InProgress,
                    extra: BTreeMap::new(),
                },
            )
            .await;

        assert!(controller.get_agent("a1").unwrap().last_active > before);
    }

    #[tokio::test]
    async fn system_status_counts_by_state() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        let t1 = controller
            .create_task(
                "hello",
                "u1",
                caps(&[AgentCapability::TextProcessing]),
                1,
                None,
                BTreeMap::new(),
            )
            .await;
        let _t2 = controller
            .create_task(
                "unmatched",
                "u1",
                caps(&[AgentCapability::CodeGeneration]),
                1,
                None,
                BTreeMap::new(),
            )
            .await;
        controller
            .update_task_status(&t1, TaskStatus::InProgress, None)
            .await;
        controller
            .update_task_status(&t1, TaskStatus::Completed, None)
            .await;

        let status = controller.get_system_status();
        assert_eq!(status.agents, 1);
        assert_eq!(status.active_agents, 1);
        assert_eq!(status.tasks, 2);
        assert_eq!(status.pending_tasks, 1);
        assert_eq!(status.completed_tasks, 1);
        assert_eq!(status.messages, controller.message_history().len());
    }

    #[tokio::test]
    async fn two_submissions_of_the_same_description_are_independent() {
        let controller = make_controller();
        register_text_agent(&controller, "a1").await;
        let required = caps(&[AgentCapability::TextProcessing]);
        let t1 = controller
            .create_task("same", "u1", required.clone(), 1, None, BTreeMap::new())
            .await;
        let t2 = controller
            .create_task("same", "u1", required, 1, None, BTreeMap::new())
            .await;

        assert_ne!(t1, t2);
        controller
            .update_task_status(&t1, TaskStatus::Failed, None)
            .await;
        assert_eq!(controller.get_task_status(&t2), Some(TaskStatus::Assigned));
    }
}
