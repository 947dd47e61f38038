//! Graph construction.
//!
//! Nodes are added as [`TaskSpec`]s and wired with [`GraphBuilder::depend`], which
//! records both directions of an edge at once: the dependency on the downstream node and
//! the continuation on the upstream node. [`GraphBuilder::build`] freezes the result into
//! an immutable [`Graph`].

use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::error::{DagError, DagResult};
use crate::graph::Graph;
use crate::node::TaskNode;
use crate::task::{Callback, NoopCallback, TypedUnit, Unit, Worker};
use crate::types::{DependencyEdge, NodeIndex};

/// Description of one node: id, worker, input and callback.
///
/// ```
/// use graphrun::{callback_fn, worker_fn, TaskSpec, WorkResult};
///
/// let spec = TaskSpec::new("square", worker_fn(|x: &u64, _| Ok(x * x)), 7)
///     .callback(callback_fn(|ok: bool, input: &u64, result: &WorkResult<u64>| {
///         println!("square({input}) ok={ok} -> {}", result.value());
///     }))
///     .check_next_idle(false);
/// ```
pub struct TaskSpec<W: Worker, C = NoopCallback> {
    id: String,
    worker: W,
    input: W::Input,
    callback: C,
    check_next_idle: bool,
}

impl<W: Worker> TaskSpec<W> {
    pub fn new(id: impl Into<String>, worker: W, input: W::Input) -> Self {
        Self {
            id: id.into(),
            worker,
            input,
            callback: NoopCallback,
            check_next_idle: true,
        }
    }
}

impl<W: Worker, C> TaskSpec<W, C> {
    /// Attach a start/terminal callback.
    pub fn callback<C2>(self, callback: C2) -> TaskSpec<W, C2>
    where
        C2: Callback<W::Input, W::Output>,
    {
        TaskSpec {
            id: self.id,
            worker: self.worker,
            input: self.input,
            callback,
            check_next_idle: self.check_next_idle,
        }
    }

    /// Enable or disable the skip-ahead check for this node (enabled by default).
    pub fn check_next_idle(mut self, enabled: bool) -> Self {
        self.check_next_idle = enabled;
        self
    }
}

struct Draft {
    id: String,
    unit: Box<dyn Unit>,
    depends: Vec<DependencyEdge>,
    next: Vec<NodeIndex>,
    check_next_idle: bool,
}

/// Mutable graph under construction.
///
/// ```
/// use graphrun::{worker_fn, GraphBuilder, TaskSpec};
///
/// let mut builder = GraphBuilder::new();
/// let fetch = builder.add(TaskSpec::new("fetch", worker_fn(|_: &(), _| Ok(3_u32)), ()));
/// let parse = builder.add(TaskSpec::new("parse", worker_fn(|_: &(), _| Ok(true)), ()));
/// builder.depend(parse, fetch, true).unwrap();
///
/// let graph = builder.build();
/// assert_eq!(graph.roots(), vec![fetch]);
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Draft>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index.
    pub fn add<W, C>(&mut self, spec: TaskSpec<W, C>) -> NodeIndex
    where
        W: Worker,
        C: Callback<W::Input, W::Output>,
    {
        let index = NodeIndex(self.nodes.len());

        #[cfg(feature = "tracing")]
        debug!(
            node = %spec.id,
            index = index.0,
            worker = std::any::type_name::<W>(),
            "adding node to graph"
        );

        self.nodes.push(Draft {
            id: spec.id,
            unit: Box::new(TypedUnit::new(spec.worker, spec.input, spec.callback)),
            depends: Vec::new(),
            next: Vec::new(),
            check_next_idle: spec.check_next_idle,
        });
        index
    }

    /// Make `node` depend on `upstream`.
    ///
    /// A `required` edge blocks `node` until `upstream` succeeded and fails it when
    /// `upstream` fails. Adding the same edge twice is a no-op; the first `required`
    /// flag is kept.
    ///
    /// # Errors
    ///
    /// Returns [`DagError::UnknownNode`] if either index was not returned by this builder.
    pub fn depend(&mut self, node: NodeIndex, upstream: NodeIndex, required: bool) -> DagResult<()> {
        for index in [node, upstream] {
            if index.0 >= self.nodes.len() {
                return Err(DagError::from(index));
            }
        }

        let edge = DependencyEdge::new(upstream, required);
        let depends = &mut self.nodes[node.0].depends;
        if !depends.contains(&edge) {
            depends.push(edge);
        }

        let next = &mut self.nodes[upstream.0].next;
        if !next.contains(&node) {
            next.push(node);
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Freeze the builder into an executable graph.
    pub fn build(self) -> Arc<Graph> {
        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                TaskNode::new(
                    NodeIndex(i),
                    draft.id,
                    draft.unit,
                    draft.depends,
                    draft.next,
                    draft.check_next_idle,
                )
            })
            .collect();

        Arc::new(Graph::from_nodes(nodes))
    }
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
