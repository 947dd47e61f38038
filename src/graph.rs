//! Graph arena holding every task node of one execution.
//!
//! Nodes are owned by the [`Graph`]; edges, the registry and in-flight jobs refer to
//! them by [`NodeIndex`]. The arena is shared behind an `Arc` for the duration of a
//! run and dropped once the caller is done reading results.

use std::any::type_name;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{DagError, DagResult};
use crate::node::TaskNode;
use crate::result::ResultStatus;
use crate::task::InputRejected;
use crate::types::{NodeIndex, NodeState};

/// A fixed DAG of task nodes, ready to be executed once.
///
/// Built with [`GraphBuilder`](crate::GraphBuilder). The graph must be acyclic; this is
/// not validated and a cycle makes the run never terminate.
pub struct Graph {
    nodes: Vec<TaskNode>,
    executed: AtomicBool,
}

impl Graph {
    pub(crate) fn from_nodes(nodes: Vec<TaskNode>) -> Self {
        Self {
            nodes,
            executed: AtomicBool::new(false),
        }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&TaskNode> {
        self.nodes.get(index.0)
    }

    /// Infallible lookup for indices stored inside the arena's own edges.
    pub(crate) fn node_at(&self, index: NodeIndex) -> &TaskNode {
        &self.nodes[index.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }

    /// Nodes without incoming edges, in insertion order.
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.nodes
            .iter()
            .filter(|node| node.dependencies().is_empty())
            .map(TaskNode::index)
            .collect()
    }

    /// Index of the node with the given id. With duplicate ids the last one wins,
    /// matching the registry.
    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .rev()
            .find(|node| node.id() == id)
            .map(TaskNode::index)
    }

    pub fn id_of(&self, index: NodeIndex) -> Option<&str> {
        self.node(index).map(TaskNode::id)
    }

    pub fn state(&self, index: NodeIndex) -> Option<NodeState> {
        self.node(index).map(TaskNode::state)
    }

    /// Result status of a node; `Unset` until it is terminal.
    pub fn status(&self, index: NodeIndex) -> Option<ResultStatus> {
        self.node(index).map(TaskNode::status)
    }

    /// Every node reachable from `roots` through continuation edges, roots included.
    ///
    /// Unknown indices are ignored.
    pub fn reachable(&self, roots: &[NodeIndex]) -> Vec<NodeIndex> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<NodeIndex> = roots
            .iter()
            .rev()
            .copied()
            .filter(|root| self.node(*root).is_some())
            .collect();

        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            order.push(index);
            stack.extend(self.node_at(index).continuations().iter().rev());
        }

        order
    }

    /// Replace a node's input before it starts.
    ///
    /// # Errors
    ///
    /// - [`DagError::UnknownNode`] if `index` is not part of this graph
    /// - [`DagError::InputSealed`] once the node left `Init`
    /// - [`DagError::TypeMismatch`] if `T` is not the node's input type
    pub fn set_input<T: Send + 'static>(&self, index: NodeIndex, input: T) -> DagResult<()> {
        let node = self.node(index).ok_or(DagError::from(index))?;

        // The state is re-checked under the input lock; `fire` claims the node before
        // it reads the input, so a swap that passes the check is the one it runs with.
        let still_open = || node.state() == NodeState::Init;

        node.unit()
            .replace_input(Box::new(input), &still_open)
            .map_err(|rejected| match rejected {
                InputRejected::Sealed => DagError::InputSealed {
                    id: node.id().to_string(),
                },
                InputRejected::WrongType => DagError::TypeMismatch {
                    id: node.id().to_string(),
                    expected: type_name::<T>(),
                    found: node.unit().input_type(),
                },
            })
    }

    /// Mark the graph as executed. Fails if it already was.
    pub(crate) fn claim(&self) -> DagResult<()> {
        self.executed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| DagError::AlreadyExecuted)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes)
            .field("executed", &self.executed.load(Ordering::SeqCst))
            .finish()
    }
}
