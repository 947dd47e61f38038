//! Run-scoped id → node lookup shared by every work unit.
//!
//! Nodes register themselves the first time they are triggered. A work unit reads other
//! nodes' results by id through [`Registry::get`], which is how downstream work reads
//! upstream outputs without a structural edge between them.

use std::any::type_name;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{DagError, DagResult};
use crate::graph::Graph;
use crate::node::TaskNode;
use crate::result::{ResultStatus, WorkResult};
use crate::types::NodeIndex;

/// Concurrent id → node mapping for one execution.
pub struct Registry {
    graph: Arc<Graph>,
    entries: DashMap<String, NodeIndex>,
}

impl Registry {
    pub(crate) fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            entries: DashMap::new(),
        }
    }

    /// Record `id → index`. Colliding ids are last-writer-wins.
    pub(crate) fn register(&self, id: &str, index: NodeIndex) {
        if self.entries.get(id).is_some_and(|entry| *entry == index) {
            return;
        }
        self.entries.insert(id.to_string(), index);
    }

    /// Typed snapshot of the result of the node registered under `id`.
    ///
    /// A node that has not reached a terminal state reads as its default value with
    /// status [`ResultStatus::Unset`].
    ///
    /// # Errors
    ///
    /// - [`DagError::NodeNotFound`] if no node registered under `id` yet
    /// - [`DagError::TypeMismatch`] if `V` is not the node's output type
    pub fn get<V: Clone + 'static>(&self, id: &str) -> DagResult<WorkResult<V>> {
        let node = self.node(id).ok_or_else(|| DagError::NodeNotFound {
            id: id.to_string(),
        })?;
        typed_result(node)
    }

    /// Status of the node registered under `id`, if any.
    pub fn status(&self, id: &str) -> Option<ResultStatus> {
        self.node(id).map(TaskNode::status)
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        let index = *self.entries.get(id)?;
        self.graph.node(index)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }
}

/// Typed snapshot of `node`'s result; `Unset` with the default value until terminal.
pub(crate) fn typed_result<V: Clone + 'static>(node: &TaskNode) -> DagResult<WorkResult<V>> {
    let result = node
        .terminal_result()
        .unwrap_or_else(|| WorkResult::new(node.unit().default_value(), ResultStatus::Unset, None));

    result.downcast::<V>().ok_or_else(|| DagError::TypeMismatch {
        id: node.id().to_string(),
        expected: type_name::<V>(),
        found: node.unit().output_type(),
    })
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .field("nodes", &self.graph.len())
            .finish()
    }
}
