//! Asynchronous message bus.
//!
//! Delivers messages to in-process subscribers through a bounded worker
//! pool and simultaneously forwards every message to an external durable
//! log. Three fan-out rules compose additively: direct subscription (by
//! agent id), broadcast (the reserved `broadcast` receiver), and topic
//! subscription (messages carrying a topic reach the direct handlers of
//! every agent subscribed to that topic). The publisher never deduplicates.
//!
//! Deliveries are routed to a worker chosen by hash of the subscribing
//! agent id: messages for one subscriber are processed in publish order,
//! while different subscribers proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::BusConfig;
use crate::traits::{LogSink, MessageHandler};
use crate::types::Message;

/// One handler invocation queued for a worker.
struct Delivery {
    handler: Arc<dyn MessageHandler>,
    message: Message,
}

/// Snapshot of the bus's subscription tables and run state.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub subscribers: usize,
    pub topics: usize,
    pub running: bool,
}

/// The asynchronous fan-out subsystem.
pub struct MessageBus {
    config: BusConfig,
    sink: Arc<dyn LogSink>,
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn MessageHandler>>>>,
    topic_subscriptions: RwLock<HashMap<String, Vec<String>>>,
    running: AtomicBool,
    worker_txs: RwLock<Vec<mpsc::Sender<Delivery>>>,
    worker_joins: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageBus {
    /// Create the bus and spawn its worker pool.
    pub fn new(config: BusConfig, sink: Arc<dyn LogSink>) -> Self {
        let workers = config.workers.max(1);
        let per_worker = (config.queue_size / workers).max(1);

        let mut txs = Vec::with_capacity(workers);
        let mut joins = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel::<Delivery>(per_worker);
            txs.push(tx);
            joins.push(tokio::spawn(worker_loop(index, rx)));
        }
        tracing::info!(workers, per_worker, "message bus started");

        Self {
            config,
            sink,
            subscribers: RwLock::new(HashMap::new()),
            topic_subscriptions: RwLock::new(HashMap::new()),
            running: AtomicBool::new(true),
            worker_txs: RwLock::new(txs),
            worker_joins: Mutex::new(joins),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Publish a message: forward it to the external log, compute the
    /// recipient handler list, and submit one delivery per handler to the
    /// worker pool.
    ///
    /// Returns true once all submissions are accepted — not once handlers
    /// complete. Returns false when the bus is shut down or a worker queue
    /// is full (submitter-rejection back-pressure; deliveries accepted
    /// before the rejection stay queued).
    pub fn publish(&self, message: &Message) -> bool {
        if !self.running.load(Ordering::Acquire) {
            tracing::warn!(
                message_id = %message.message_id,
                "bus is not running, dropping publish"
            );
            return false;
        }

        // External log first: fire-and-forget, failure never blocks local
        // delivery.
        let sink = Arc::clone(&self.sink);
        let topic = self.config.message_topic.clone();
        let forwarded = message.clone();
        tokio::spawn(async move {
            let key = forwarded.message_id.clone();
            if let Err(e) = sink.send(&topic, &key, &forwarded).await {
                tracing::warn!(message_id = %key, error = %e, "external log sink failed");
            }
        });

        let recipients = self.recipients_for(message);
        if recipients.is_empty() {
            tracing::warn!(
                message_id = %message.message_id,
                receiver_id = %message.receiver_id,
                "no subscribers for message"
            );
            return true;
        }

        let txs = self.worker_txs.read();
        if txs.is_empty() {
            return false;
        }
        for (agent_id, handler) in recipients {
            let index = (hash_of(&agent_id) as usize) % txs.len();
            let delivery = Delivery {
                handler,
                message: message.clone(),
            };
            match txs[index].try_send(delivery) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        message_id = %message.message_id,
                        worker = index,
                        "delivery queue full, rejecting publish"
                    );
                    return false;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(message_id = %message.message_id, "worker queue closed");
                    return false;
                }
            }
        }
        true
    }

    /// Handlers reached by the direct / broadcast / topic rules, paired
    /// with the agent id they are subscribed under.
    fn recipients_for(&self, message: &Message) -> Vec<(String, Arc<dyn MessageHandler>)> {
        let subscribers = self.subscribers.read();
        let mut out = Vec::new();

        if message.is_broadcast() {
            for (agent_id, handlers) in subscribers.iter() {
                for h in handlers {
                    out.push((agent_id.clone(), Arc::clone(h)));
                }
            }
        } else if let Some(handlers) = subscribers.get(&message.receiver_id) {
            for h in handlers {
                out.push((message.receiver_id.clone(), Arc::clone(h)));
            }
        }

        if let Some(topic) = &message.topic {
            let topics = self.topic_subscriptions.read();
            if let Some(agent_ids) = topics.get(topic) {
                for agent_id in agent_ids {
                    if let Some(handlers) = subscribers.get(agent_id) {
                        for h in handlers {
                            out.push((agent_id.clone(), Arc::clone(h)));
                        }
                    }
                }
            }
        }

        out
    }

    /// Register a handler for messages addressed to `agent_id`. No-op
    /// returning false after shutdown.
    pub fn subscribe(&self, agent_id: &str, handler: Arc<dyn MessageHandler>) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.subscribers
            .write()
            .entry(agent_id.to_string())
            .or_default()
            .push(handler);
        tracing::info!(agent_id, "subscribed to messages");
        true
    }

    /// Remove a specific handler (matched by pointer identity), or — when
    /// `handler` is omitted — every handler for the agent along with all of
    /// its topic memberships. No-op returning false after shutdown.
    pub fn unsubscribe(&self, agent_id: &str, handler: Option<&Arc<dyn MessageHandler>>) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        match handler {
            Some(target) => {
                let mut subscribers = self.subscribers.write();
                let Some(handlers) = subscribers.get_mut(agent_id) else {
                    tracing::warn!(agent_id, "agent not found in subscribers");
                    return false;
                };
                let before = handlers.len();
                handlers.retain(|h| !Arc::ptr_eq(h, target));
                if handlers.len() == before {
                    tracing::warn!(agent_id, "handler not found in subscriptions");
                    return false;
                }
                true
            }
            None => {
                if self.subscribers.write().remove(agent_id).is_none() {
                    tracing::warn!(agent_id, "agent not found in subscribers");
                    return false;
                }
                let mut topics = self.topic_subscriptions.write();
                for agents in topics.values_mut() {
                    agents.retain(|a| a != agent_id);
                }
                tracing::info!(agent_id, "all subscriptions removed");
                true
            }
        }
    }

    /// Subscribe an agent to a topic. Returns false when already
    /// subscribed, or after shutdown.
    pub fn subscribe_to_topic(&self, agent_id: &str, topic: &str) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        let mut topics = self.topic_subscriptions.write();
        let agents = topics.entry(topic.to_string()).or_default();
        if agents.iter().any(|a| a == agent_id) {
            return false;
        }
        agents.push(agent_id.to_string());
        tracing::info!(agent_id, topic, "subscribed to topic");
        true
    }

    pub fn unsubscribe_from_topic(&self, agent_id: &str, topic: &str) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        let mut topics = self.topic_subscriptions.write();
        let Some(agents) = topics.get_mut(topic) else {
            tracing::warn!(topic, "topic not found in subscriptions");
            return false;
        };
        let before = agents.len();
        agents.retain(|a| a != agent_id);
        if agents.len() == before {
            tracing::warn!(agent_id, topic, "agent not subscribed to topic");
            return false;
        }
        tracing::info!(agent_id, topic, "unsubscribed from topic");
        true
    }

    /// Stop accepting submissions, drain in-flight deliveries within the
    /// configured grace period, then abort any remaining worker.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down message bus");
        self.running.store(false, Ordering::Release);
        // Dropping the senders lets workers drain their queues and exit.
        self.worker_txs.write().clear();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_joins.lock());
        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let deadline = tokio::time::Instant::now() + grace;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                tracing::warn!("worker did not drain within grace period, aborting");
                handle.abort();
            }
        }
        tracing::info!("message bus shutdown complete");
    }

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            subscribers: self.subscribers.read().len(),
            topics: self.topic_subscriptions.read().len(),
            running: self.running.load(Ordering::Acquire),
        }
    }
}

async fn worker_loop(index: usize, mut rx: mpsc::Receiver<Delivery>) {
    while let Some(delivery) = rx.recv().await {
        let message_id = delivery.message.message_id.clone();
        if let Err(e) = delivery.handler.handle(delivery.message).await {
            tracing::error!(worker = index, %message_id, error = %e, "message handler failed");
        }
    }
    tracing::debug!(worker = index, "bus worker exited");
}

fn hash_of(agent_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    agent_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::InMemoryLogSink;
    use crate::errors::HandlerError;
    use crate::types::{MessagePayload, SystemSignal, TaskStatus, BROADCAST_ID};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Records every message id it sees, in arrival order.
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: Message) -> Result<(), HandlerError> {
            self.seen.lock().push(message.message_id);
            Ok(())
        }
    }

    /// Sleeps before acknowledging, to occupy a worker.
    struct SlowHandler {
        delay_ms: u64,
        completed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MessageHandler for SlowHandler {
        async fn handle(&self, _message: Message) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.completed.store(true, Ordering::Release);
            Ok(())
        }
    }

    fn notification() -> MessagePayload {
        MessagePayload::SystemNotification {
            signal: SystemSignal::Resume,
            extra: BTreeMap::new(),
        }
    }

    fn make_bus(config: BusConfig) -> (MessageBus, Arc<InMemoryLogSink>) {
        let sink = Arc::new(InMemoryLogSink::new());
        let bus = MessageBus::new(config, sink.clone());
        (bus, sink)
    }

    async fn drain() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn broadcast_reaches_every_direct_handler_once() {
        let (bus, _sink) = make_bus(BusConfig::default());
        let h1 = RecordingHandler::new();
        let h2 = RecordingHandler::new();
        assert!(bus.subscribe("a1", h1.clone()));
        assert!(bus.subscribe("a2", h2.clone()));

        let msg = Message::new("controller", BROADCAST_ID, notification());
        assert!(bus.publish(&msg));
        drain().await;

        assert_eq!(h1.seen(), vec![msg.message_id.clone()]);
        assert_eq!(h2.seen(), vec![msg.message_id.clone()]);
    }

    #[tokio::test]
    async fn direct_delivery_targets_only_the_receiver() {
        let (bus, _sink) = make_bus(BusConfig::default());
        let h1 = RecordingHandler::new();
        let h2 = RecordingHandler::new();
        bus.subscribe("a1", h1.clone());
        bus.subscribe("a2", h2.clone());

        let msg = Message::new("controller", "a1", notification());
        assert!(bus.publish(&msg));
        drain().await;

        assert_eq!(h1.seen().len(), 1);
        assert!(h2.seen().is_empty());
    }

    #[tokio::test]
    async fn topic_fanout_composes_with_direct_delivery() {
        let (bus, _sink) = make_bus(BusConfig::default());
        let h1 = RecordingHandler::new();
        let h2 = RecordingHandler::new();
        bus.subscribe("a1", h1.clone());
        bus.subscribe("a2", h2.clone());
        assert!(bus.subscribe_to_topic("a1", "alerts"));
        assert!(bus.subscribe_to_topic("a2", "alerts"));
        // Re-subscribing the same agent to a topic is rejected.
        assert!(!bus.subscribe_to_topic("a2", "alerts"));

        let msg = Message::new("controller", "a1", notification()).with_topic("alerts");
        assert!(bus.publish(&msg));
        drain().await;

        // a1 receives it twice (direct + topic) — no deduplication.
        assert_eq!(h1.seen().len(), 2);
        assert_eq!(h2.seen().len(), 1);
    }

    #[tokio::test]
    async fn zero_subscribers_still_reaches_the_sink() {
        let (bus, sink) = make_bus(BusConfig::default());
        let msg = Message::new("controller", "nobody", notification());
        assert!(bus.publish(&msg));
        drain().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, msg.message_id);
        assert_eq!(records[0].topic, "mcp-messages");
    }

    #[tokio::test]
    async fn per_receiver_delivery_order_is_preserved() {
        let (bus, _sink) = make_bus(BusConfig {
            workers: 4,
            ..BusConfig::default()
        });
        let handler = RecordingHandler::new();
        bus.subscribe("a1", handler.clone());

        let mut ids = Vec::new();
        for _ in 0..32 {
            let msg = Message::new("controller", "a1", notification());
            ids.push(msg.message_id.clone());
            assert!(bus.publish(&msg));
        }
        drain().await;

        assert_eq!(handler.seen(), ids);
    }

    #[tokio::test]
    async fn full_queue_rejects_the_submitter() {
        let (bus, _sink) = make_bus(BusConfig {
            workers: 1,
            queue_size: 1,
            ..BusConfig::default()
        });
        let completed = Arc::new(AtomicBool::new(false));
        bus.subscribe(
            "a1",
            Arc::new(SlowHandler {
                delay_ms: 500,
                completed: completed.clone(),
            }),
        );

        // First publish occupies the worker, second fills the single queue
        // slot, third is rejected.
        assert!(bus.publish(&Message::new("p", "a1", notification())));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(bus.publish(&Message::new("p", "a1", notification())));
        assert!(!bus.publish(&Message::new("p", "a1", notification())));
    }

    #[tokio::test]
    async fn unsubscribe_specific_handler_keeps_the_rest() {
        let (bus, _sink) = make_bus(BusConfig::default());
        let h1 = RecordingHandler::new();
        let h2 = RecordingHandler::new();
        bus.subscribe("a1", h1.clone());
        bus.subscribe("a1", h2.clone());

        let target: Arc<dyn MessageHandler> = h1.clone();
        assert!(bus.unsubscribe("a1", Some(&target)));
        // Removing it again fails.
        assert!(!bus.unsubscribe("a1", Some(&target)));

        bus.publish(&Message::new("p", "a1", notification()));
        drain().await;
        assert!(h1.seen().is_empty());
        assert_eq!(h2.seen().len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_all_drops_topic_memberships() {
        let (bus, _sink) = make_bus(BusConfig::default());
        let h1 = RecordingHandler::new();
        bus.subscribe("a1", h1.clone());
        bus.subscribe_to_topic("a1", "alerts");

        assert!(bus.unsubscribe("a1", None));
        assert!(!bus.unsubscribe("a1", None));
        // Topic membership is gone too.
        assert!(!bus.unsubscribe_from_topic("a1", "alerts"));

        bus.publish(&Message::new("p", "nobody", notification()).with_topic("alerts"));
        drain().await;
        assert!(h1.seen().is_empty());
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work_and_flips_status() {
        let (bus, _sink) = make_bus(BusConfig {
            shutdown_grace_ms: 200,
            ..BusConfig::default()
        });
        let handler = RecordingHandler::new();
        bus.subscribe("a1", handler.clone());
        bus.subscribe_to_topic("a1", "alerts");

        bus.shutdown().await;

        assert!(!bus.publish(&Message::new("p", "a1", notification())));
        assert!(!bus.subscribe("a2", RecordingHandler::new()));
        assert!(!bus.subscribe_to_topic("a1", "news"));

        // Unsubscription is also a no-op now: the tables stay as they were.
        let target: Arc<dyn MessageHandler> = handler.clone();
        assert!(!bus.unsubscribe("a1", Some(&target)));
        assert!(!bus.unsubscribe("a1", None));
        assert!(!bus.unsubscribe_from_topic("a1", "alerts"));

        let status = bus.queue_status();
        assert!(!status.running);
        assert_eq!(status.subscribers, 1);
        assert_eq!(status.topics, 1);
    }

    #[tokio::test]
    async fn shutdown_grace_allows_inflight_handlers_to_finish() {
        let (bus, _sink) = make_bus(BusConfig {
            workers: 1,
            shutdown_grace_ms: 500,
            ..BusConfig::default()
        });
        let completed = Arc::new(AtomicBool::new(false));
        bus.subscribe(
            "a1",
            Arc::new(SlowHandler {
                delay_ms: 100,
                completed: completed.clone(),
            }),
        );

        assert!(bus.publish(&Message::new("p", "a1", notification())));
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.shutdown().await;

        assert!(completed.load(Ordering::Acquire));
        assert!(!bus.queue_status().running);
    }

    #[tokio::test]
    async fn shutdown_force_terminates_past_the_grace_window() {
        let (bus, _sink) = make_bus(BusConfig {
            workers: 1,
            shutdown_grace_ms: 50,
            ..BusConfig::default()
        });
        let completed = Arc::new(AtomicBool::new(false));
        bus.subscribe(
            "a1",
            Arc::new(SlowHandler {
                delay_ms: 5000,
                completed: completed.clone(),
            }),
        );

        assert!(bus.publish(&Message::new("p", "a1", notification())));
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.shutdown().await;

        assert!(!completed.load(Ordering::Acquire));
        assert!(!bus.queue_status().running);
    }

    /// A durable log that is always down.
    struct FailingSink;

    #[async_trait]
    impl LogSink for FailingSink {
        async fn send(
            &self,
            _topic: &str,
            _key: &str,
            _message: &Message,
        ) -> Result<(), crate::errors::SinkError> {
            Err(crate::errors::SinkError::Sink {
                message: "log transport down".into(),
            })
        }
    }

    #[tokio::test]
    async fn sink_failures_never_block_local_delivery() {
        let bus = MessageBus::new(BusConfig::default(), Arc::new(FailingSink));
        let handler = RecordingHandler::new();
        bus.subscribe("a1", handler.clone());

        assert!(bus.publish(&Message::new("p", "a1", notification())));
        drain().await;
        assert_eq!(handler.seen().len(), 1);
    }

    #[tokio::test]
    async fn task_update_messages_flow_like_any_other_kind() {
        let (bus, _sink) = make_bus(BusConfig::default());
        let handler = RecordingHandler::new();
        bus.subscribe("controller", handler.clone());

        let msg = Message::new(
            "a1",
            "controller",
            MessagePayload::TaskUpdate {
                task_id: "t1".into(),
                status: TaskStatus::InProgress,
                extra: BTreeMap::new(),
            },
        );
        assert!(bus.publish(&msg));
        drain().await;
        assert_eq!(handler.seen(), vec![msg.message_id]);
    }
}
