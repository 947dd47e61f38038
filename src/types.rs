//! Core type definitions for graph nodes and edges.
//!
//! This module defines the plain value types shared by the builder, the node state
//! machine and the runner: node indices into the graph arena, the node lifecycle
//! state, and dependency edges.

use std::fmt;

/// Opaque index of a node inside its [`Graph`](crate::Graph) arena.
///
/// Indices are handed out by [`GraphBuilder::add`](crate::GraphBuilder::add) and are
/// only meaningful for the graph that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    /// Position of the node in insertion order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a task node.
///
/// Transitions are monotonic: `Init → Working → Finished | Errored` or
/// `Init → Errored`. Nothing leaves `Finished` or `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeState {
    /// Not claimed by any thread yet
    Init = 0,
    /// The work unit is running
    Working = 1,
    /// The work unit returned a value
    Finished = 2,
    /// The node was force-failed (timeout, upstream failure, error, skip)
    Errored = 3,
}

impl NodeState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => NodeState::Init,
            1 => NodeState::Working,
            2 => NodeState::Finished,
            _ => NodeState::Errored,
        }
    }

    /// Returns true for `Finished` and `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Finished | NodeState::Errored)
    }
}

/// Incoming dependency of a node.
///
/// `required = true` means the owning node may only run once `source` finished
/// successfully; a failed or timed-out required source force-fails the owner. A node
/// without any required edge runs as soon as any one of its sources is terminal.
///
/// Equality is by `source` only, which makes edge insertion idempotent.
#[derive(Debug, Clone, Copy)]
pub struct DependencyEdge {
    pub(crate) source: NodeIndex,
    pub(crate) required: bool,
}

impl DependencyEdge {
    pub(crate) fn new(source: NodeIndex, required: bool) -> Self {
        Self { source, required }
    }

    /// The upstream node this edge waits on.
    pub fn source(&self) -> NodeIndex {
        self.source
    }

    /// Whether the upstream must succeed before the owner may run.
    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl PartialEq for DependencyEdge {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for DependencyEdge {}
