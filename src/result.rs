//! Result model produced by one unit of work.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::TaskError;

/// Type-erased output value shared between the arena, the registry and callbacks.
pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;

/// Outcome class of a node.
///
/// `Unset` is the only pre-execution value. Every node that took part in a run ends in
/// exactly one of the other three, and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    /// The work unit returned a value
    Success,
    /// The time budget ran out, or the node was force-stopped without a captured error
    Timeout,
    /// The work unit (or a required upstream) failed with an error
    Exception,
    /// The node has not reached a terminal state
    Unset,
}

impl ResultStatus {
    /// Returns true for `Timeout` and `Exception`.
    pub fn is_failure(self) -> bool {
        matches!(self, ResultStatus::Timeout | ResultStatus::Exception)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultStatus::Success => "success",
            ResultStatus::Timeout => "timeout",
            ResultStatus::Exception => "exception",
            ResultStatus::Unset => "unset",
        };
        f.write_str(name)
    }
}

/// Value, status and optional error of one node.
///
/// On the failure paths `value` holds the work unit's
/// [`default_value`](crate::Worker::default_value), which is the only value downstream
/// nodes ever see from a failed node.
#[derive(Debug, Clone)]
pub struct WorkResult<V> {
    value: V,
    status: ResultStatus,
    error: Option<TaskError>,
}

impl<V> WorkResult<V> {
    pub(crate) fn new(value: V, status: ResultStatus, error: Option<TaskError>) -> Self {
        Self {
            value,
            status,
            error,
        }
    }

    pub(crate) fn success(value: V) -> Self {
        Self::new(value, ResultStatus::Success, None)
    }

    /// Failure result: `Timeout` without an error, `Exception` with one.
    pub(crate) fn failure(default: V, error: Option<TaskError>) -> Self {
        let status = if error.is_some() {
            ResultStatus::Exception
        } else {
            ResultStatus::Timeout
        };
        Self::new(default, status, error)
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

impl WorkResult<Dynamic> {
    /// Recover the concrete value type, cloning it out of the shared allocation.
    pub(crate) fn downcast<V: Clone + 'static>(&self) -> Option<WorkResult<V>> {
        let value = self.value.downcast_ref::<V>()?.clone();
        Some(WorkResult::new(value, self.status, self.error.clone()))
    }
}
