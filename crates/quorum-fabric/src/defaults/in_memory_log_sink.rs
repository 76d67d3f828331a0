//! In-memory durable-log stand-in that records every forwarded message.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::SinkError;
use crate::traits::LogSink;
use crate::types::Message;

/// One record as it would land in the external log.
#[derive(Debug, Clone)]
pub struct SinkRecord {
    pub topic: String,
    pub key: String,
    pub message: Message,
}

/// Records (topic, key, message) triples for inspection.
#[derive(Default)]
pub struct InMemoryLogSink {
    records: Mutex<Vec<SinkRecord>>,
}

impl InMemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl LogSink for InMemoryLogSink {
    async fn send(&self, topic: &str, key: &str, message: &Message) -> Result<(), SinkError> {
        self.records.lock().push(SinkRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}
