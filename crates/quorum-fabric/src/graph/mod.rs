//! Workflow graph engine.
//!
//! A typed, state-carrying directed graph: named node functions, predicate
//! edges evaluated in insertion order, a single entry node, and one or
//! more terminal nodes. Nodes are stored in a flat array and edges address
//! them by index, so successor selection during execution is O(edges from
//! the current node) with no hashing.

mod state;

pub use state::WorkflowState;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{GraphError, NodeError};

/// A named unit of work inside a graph. Reads and writes the shared
/// [`WorkflowState`]; the return value is recorded per node name.
#[async_trait]
pub trait GraphNode: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError>;
}

/// Adapter turning a plain closure into a [`GraphNode`].
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&WorkflowState) -> Result<Value, NodeError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> GraphNode for FnNode<F>
where
    F: Fn(&WorkflowState) -> Result<Value, NodeError> + Send + Sync,
{
    async fn run(&self, state: &WorkflowState) -> Result<Value, NodeError> {
        (self.f)(state)
    }
}

type Predicate = Box<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

struct NodeSlot {
    name: String,
    node: Arc<dyn GraphNode>,
}

struct EdgeSlot {
    target: usize,
    predicate: Predicate,
}

/// Outcome of one graph execution.
#[derive(Debug)]
pub struct GraphResult {
    pub success: bool,
    pub execution_path: Vec<String>,
    pub node_outputs: BTreeMap<String, Value>,
    pub error_message: Option<String>,
}

impl GraphResult {
    /// Output of the last node on the path.
    pub fn last_output(&self) -> Option<&Value> {
        self.execution_path
            .last()
            .and_then(|name| self.node_outputs.get(name))
    }
}

/// The graph itself. Build with the `add_*` methods, then [`execute`](Self::execute).
#[derive(Default)]
pub struct WorkflowGraph {
    nodes: Vec<NodeSlot>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<EdgeSlot>>,
    entry: Option<usize>,
    terminals: HashSet<usize>,
    scratchpad: parking_lot::RwLock<BTreeMap<String, Value>>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a named node.
    pub fn add_node(&mut self, name: impl Into<String>, node: impl GraphNode + 'static) -> &mut Self {
        let name = name.into();
        let node: Arc<dyn GraphNode> = Arc::new(node);
        match self.index.get(&name) {
            Some(&i) => self.nodes[i].node = node,
            None => {
                let i = self.nodes.len();
                self.index.insert(name.clone(), i);
                self.nodes.push(NodeSlot { name, node });
                self.edges.push(Vec::new());
            }
        }
        self
    }

    /// Select the single entry node. The node must already exist.
    pub fn set_entry_point(&mut self, name: &str) -> Result<&mut Self, GraphError> {
        let i = self.lookup(name)?;
        self.entry = Some(i);
        Ok(self)
    }

    /// Mark a node terminal. Execution stops (after running it) when a
    /// terminal node is reached.
    pub fn add_terminal(&mut self, name: &str) -> Result<&mut Self, GraphError> {
        let i = self.lookup(name)?;
        self.terminals.insert(i);
        Ok(self)
    }

    /// Unconditional edge — sugar for a predicate that always holds.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<&mut Self, GraphError> {
        self.add_conditional_edge(from, to, |_| true)
    }

    /// Edge taken when `predicate` holds against the current state. Among
    /// several passing edges from one node, the first added wins.
    pub fn add_conditional_edge(
        &mut self,
        from: &str,
        to: &str,
        predicate: impl Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    ) -> Result<&mut Self, GraphError> {
        let from_i = self.lookup(from)?;
        let to_i = self.lookup(to)?;
        self.edges[from_i].push(EdgeSlot {
            target: to_i,
            predicate: Box::new(predicate),
        });
        tracing::debug!(from, to, "edge added");
        Ok(self)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Per-execution scratchpad, cleared at the start of every
    /// [`execute`](Self::execute) call.
    pub fn set_scratch(&self, key: impl Into<String>, value: Value) {
        self.scratchpad.write().insert(key.into(), value);
    }

    pub fn get_scratch(&self, key: &str) -> Option<Value> {
        self.scratchpad.read().get(key).cloned()
    }

    /// Run the graph against `state`.
    ///
    /// Walks from the entry node, executing each node and picking the
    /// first outgoing edge whose predicate holds. A node with no passing
    /// edge terminates the run early (still a success). A node error stops
    /// the run with a failure result carrying the partial path and outputs.
    pub async fn execute(&self, state: &WorkflowState) -> Result<GraphResult, GraphError> {
        let entry = self.entry.ok_or(GraphError::NoEntryPoint)?;
        self.scratchpad.write().clear();

        let mut current = entry;
        let mut path: Vec<String> = Vec::new();
        let mut outputs: BTreeMap<String, Value> = BTreeMap::new();

        while !self.terminals.contains(&current) {
            let slot = &self.nodes[current];
            tracing::debug!(node = %slot.name, "executing node");
            path.push(slot.name.clone());

            match slot.node.run(state).await {
                Ok(output) => {
                    outputs.insert(slot.name.clone(), output);
                }
                Err(e) => {
                    tracing::error!(node = %slot.name, error = %e, "node failed");
                    return Ok(GraphResult {
                        success: false,
                        execution_path: path,
                        node_outputs: outputs,
                        error_message: Some(e.to_string()),
                    });
                }
            }

            match self.edges[current]
                .iter()
                .find(|e| (e.predicate)(state))
                .map(|e| e.target)
            {
                Some(next) => current = next,
                None => {
                    tracing::warn!(node = %self.nodes[current].name, "no valid transition");
                    return Ok(GraphResult {
                        success: true,
                        execution_path: path,
                        node_outputs: outputs,
                        error_message: None,
                    });
                }
            }
        }

        // Terminal node runs too.
        let slot = &self.nodes[current];
        tracing::debug!(node = %slot.name, "executing terminal node");
        path.push(slot.name.clone());
        match slot.node.run(state).await {
            Ok(output) => {
                outputs.insert(slot.name.clone(), output);
                Ok(GraphResult {
                    success: true,
                    execution_path: path,
                    node_outputs: outputs,
                    error_message: None,
                })
            }
            Err(e) => {
                tracing::error!(node = %slot.name, error = %e, "terminal node failed");
                Ok(GraphResult {
                    success: false,
                    execution_path: path,
                    node_outputs: outputs,
                    error_message: Some(e.to_string()),
                })
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound {
                name: name.to_string(),
            })
    }
}
