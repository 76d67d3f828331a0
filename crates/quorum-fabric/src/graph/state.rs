//! Shared state threaded through a workflow execution.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;

/// Value store plus a per-key ordered history of every written value.
///
/// Nodes share one state by reference and read/write through it; interior
/// locking keeps individual operations atomic.
#[derive(Default)]
pub struct WorkflowState {
    values: RwLock<BTreeMap<String, Value>>,
    history: RwLock<BTreeMap<String, Vec<Value>>>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(initial: BTreeMap<String, Value>) -> Self {
        let state = Self::new();
        for (key, value) in initial {
            state.set(key, value);
        }
        state
    }

    /// Write a value and append it to the key's history.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.history
            .write()
            .entry(key.clone())
            .or_default()
            .push(value.clone());
        self.values.write().insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Boolean read with a default, the shape edge predicates want.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Remove the current value; the key's history is preserved.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Every value ever written to the key, oldest first.
    pub fn history(&self, key: &str) -> Vec<Value> {
        self.history.read().get(key).cloned().unwrap_or_default()
    }

    pub fn last_history(&self, key: &str) -> Option<Value> {
        self.history
            .read()
            .get(key)
            .and_then(|h| h.last().cloned())
    }

    /// Copy of the current values.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.values.read().clone()
    }

    pub fn clear(&self) {
        self.values.write().clear();
        self.history.write().clear();
    }

    /// Deep copy of values and histories at this instant.
    pub fn snapshot(&self) -> WorkflowState {
        WorkflowState {
            values: RwLock::new(self.values.read().clone()),
            history: RwLock::new(self.history.read().clone()),
        }
    }

    /// Point-wise overwrite of values; histories concatenate, with the
    /// other side's entries landing after the existing ones.
    pub fn merge(&self, other: &WorkflowState) {
        {
            let mut values = self.values.write();
            for (key, value) in other.values.read().iter() {
                values.insert(key.clone(), value.clone());
            }
        }
        let mut history = self.history.write();
        for (key, entries) in other.history.read().iter() {
            history
                .entry(key.clone())
                .or_default()
                .extend(entries.iter().cloned());
        }
    }
}

impl std::fmt::Debug for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowState")
            .field("values", &self.values.read().len())
            .field("history_keys", &self.history.read().len())
            .finish()
    }
}
