//! Error types for graph construction, execution and per-node failures.
//!
//! Two layers of errors exist:
//!
//! - [`DagError`] is returned to the caller of the builder, the runner and the registry.
//!   It only describes misuse of the API (unknown indices, wrong types, re-running a graph).
//! - [`TaskError`] is recorded inside a node's [`WorkResult`](crate::WorkResult). It never
//!   escapes from [`Runner::execute`](crate::Runner::execute); callers pull it from the
//!   registry after the run.

use std::sync::Arc;

use thiserror::Error;

use crate::types::NodeIndex;

/// Boxed error returned by a work unit.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while building, executing or inspecting a graph
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DagError {
    /// A [`NodeIndex`] does not belong to the graph it was used with
    #[error("Node #{index} does not exist in this graph")]
    UnknownNode { index: usize },

    /// No node was registered under the given id during the run
    #[error("No node with id '{id}' was registered during this run")]
    NodeNotFound { id: String },

    /// A value was read or written with a type different from the node's declared type
    #[error("Type mismatch for node '{id}': requested {expected}, node uses {found}")]
    TypeMismatch {
        id: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The graph has already been handed to a runner once
    #[error(
        "This graph has already been executed.\n\
         \n\
         Task nodes are single-use: build a fresh graph for every run."
    )]
    AlreadyExecuted,

    /// The node already started, so its input can no longer be replaced
    #[error("Input of node '{id}' can no longer be replaced: the node has already started")]
    InputSealed { id: String },

    /// The worker pool could not be created
    #[error("Failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for graph operations
pub type DagResult<T> = Result<T, DagError>;

/// Why a node ended in a failed terminal state.
///
/// Cloning is cheap: the payload is shared, so a required downstream node records the
/// very same error its upstream produced.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// The work unit returned an error
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The work unit (or its start hook) panicked
    #[error("Task panicked: {message}")]
    Panicked { message: String },

    /// The node was superseded: its single-successor chain had already finished
    #[error("Task skipped: downstream chain already produced a result")]
    Skipped,
}

impl TaskError {
    /// Wrap an error returned by a work unit.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        TaskError::Failed(Arc::from(err.into()))
    }

    /// Build a [`TaskError::Panicked`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        TaskError::Panicked {
            message: panic_message(payload.as_ref()),
        }
    }

    /// Returns true for the skip-ahead marker.
    pub fn is_skipped(&self) -> bool {
        matches!(self, TaskError::Skipped)
    }
}

impl From<BoxError> for TaskError {
    fn from(err: BoxError) -> Self {
        TaskError::Failed(Arc::from(err))
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl From<NodeIndex> for DagError {
    fn from(index: NodeIndex) -> Self {
        DagError::UnknownNode { index: index.0 }
    }
}
