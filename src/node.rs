//! Task node state machine and its execution / fan-out protocol.
//!
//! A [`TaskNode`] is triggered through `run`, once per upstream completion (roots are
//! triggered by the runner). Every trigger re-evaluates the node's dependencies, so the
//! protocol has to be idempotent: many threads may call `run` on the same node, and
//! exactly one of them wins each state transition.
//!
//! # State and result
//!
//! `state` is an atomic `Init → Working → Finished | Errored` (or `Init → Errored`).
//! Terminal transitions are made with the node's result mutex held: the winner of the
//! terminal compare-and-swap stores the [`WorkResult`] before releasing the lock. Any
//! reader that observes a terminal state and then locks the result therefore sees the
//! final value. The mutex is per node; no lock spans the graph.
//!
//! # Time budget
//!
//! Every `run` receives the remaining budget in milliseconds. It shrinks by the time a
//! node spends before handing off to its continuations. A node that receives an
//! exhausted budget fails itself with `Timeout` and passes the exhausted budget on, so a
//! global timeout cascades down the graph without any cross-node signaling.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::error::TaskError;
use crate::graph::Graph;
use crate::pool::{await_all, deadline_after, submit};
use crate::registry::Registry;
use crate::result::{Dynamic, ResultStatus, WorkResult};
use crate::runner::RunScope;
use crate::task::Unit;
use crate::types::{DependencyEdge, NodeIndex, NodeState};

/// One unit of scheduled work plus its state, result and edges.
///
/// Nodes are created by [`GraphBuilder`](crate::GraphBuilder) and live in a
/// [`Graph`] arena; edges refer to other nodes by [`NodeIndex`].
pub struct TaskNode {
    index: NodeIndex,
    id: String,
    unit: Box<dyn Unit>,
    depends: Vec<DependencyEdge>,
    next: Vec<NodeIndex>,
    state: AtomicU8,
    result: Mutex<Option<WorkResult<Dynamic>>>,
    check_next_idle: bool,
}

impl TaskNode {
    pub(crate) fn new(
        index: NodeIndex,
        id: String,
        unit: Box<dyn Unit>,
        depends: Vec<DependencyEdge>,
        next: Vec<NodeIndex>,
        check_next_idle: bool,
    ) -> Self {
        Self {
            index,
            id,
            unit,
            depends,
            next,
            state: AtomicU8::new(NodeState::Init as u8),
            result: Mutex::new(None),
            check_next_idle,
        }
    }

    /// Caller-assigned id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Status of the node's result; `Unset` until the node is terminal.
    pub fn status(&self) -> ResultStatus {
        self.terminal_result()
            .map_or(ResultStatus::Unset, |result| result.status())
    }

    /// Incoming edges, in insertion order. Empty for roots.
    pub fn dependencies(&self) -> &[DependencyEdge] {
        &self.depends
    }

    /// Outgoing continuation edges, in insertion order. Empty for leaves.
    pub fn continuations(&self) -> &[NodeIndex] {
        &self.next
    }

    /// Whether the skip-ahead check runs before this node executes.
    pub fn checks_next_idle(&self) -> bool {
        self.check_next_idle
    }

    pub(crate) fn unit(&self) -> &dyn Unit {
        self.unit.as_ref()
    }

    /// The recorded result, only once the node is terminal.
    pub(crate) fn terminal_result(&self) -> Option<WorkResult<Dynamic>> {
        if !self.state().is_terminal() {
            return None;
        }
        self.result.lock().clone()
    }

    /// Entry point of the protocol, invoked by the runner for roots and by
    /// predecessors during fan-out.
    pub(crate) fn run(&self, scope: &Arc<RunScope>, from: Option<NodeIndex>, remaining_ms: i64) {
        scope.registry.register(&self.id, self.index);
        let entered = scope.clock.now_millis();

        if remaining_ms <= 0 {
            #[cfg(feature = "tracing")]
            trace!(node = %self.id, budget_ms = remaining_ms, "budget exhausted");

            self.force_fail(NodeState::Init, None);
            self.fan_out(scope, entered, remaining_ms);
            return;
        }

        // A second predecessor completing after this node already settled.
        if self.state().is_terminal() {
            self.fan_out(scope, entered, remaining_ms);
            return;
        }

        let graph = scope.graph();
        if self.check_next_idle && self.superseded(graph) {
            #[cfg(feature = "tracing")]
            debug!(node = %self.id, "downstream chain already finished, skipping");

            self.force_fail(NodeState::Init, Some(TaskError::Skipped));
        } else {
            match self.depends.len() {
                0 => {
                    self.fire(&scope.registry);
                }
                1 => self.resolve_single(graph, &scope.registry),
                _ => self.resolve_many(graph, &scope.registry, from),
            }
        }

        // Losers of the claim race leave fan-out to the thread that settles the node.
        if self.state().is_terminal() {
            self.fan_out(scope, entered, remaining_ms);
        }
    }

    fn resolve_single(&self, graph: &Graph, registry: &Registry) {
        let source = graph.node_at(self.depends[0].source);

        match source.terminal_result() {
            // Not settled yet; its own fan-out will trigger us again.
            None => {}
            Some(upstream) if upstream.status().is_failure() => {
                self.inherit_failure(&upstream);
            }
            Some(_) => {
                self.fire(registry);
            }
        }
    }

    fn resolve_many(&self, graph: &Graph, registry: &Registry, from: Option<NodeIndex>) {
        if self.state() != NodeState::Init {
            return;
        }

        let has_required = self.depends.iter().any(|edge| edge.required);

        if !has_required {
            // First-past-the-post: whichever source settled first decides.
            let trigger = from
                .filter(|from| self.depends.iter().any(|edge| edge.source == *from))
                .and_then(|from| graph.node_at(from).terminal_result())
                .or_else(|| {
                    self.depends
                        .iter()
                        .find_map(|edge| graph.node_at(edge.source).terminal_result())
                });

            match trigger {
                None => {}
                Some(upstream) if upstream.status() == ResultStatus::Timeout => {
                    self.force_fail(NodeState::Init, None);
                }
                Some(_) => {
                    self.fire(registry);
                }
            }
            return;
        }

        let from_required = from.map_or(true, |from| {
            self.depends
                .iter()
                .any(|edge| edge.required && edge.source == from)
        });
        if !from_required {
            return;
        }

        let mut waiting = false;
        for edge in self.depends.iter().filter(|edge| edge.required) {
            match graph.node_at(edge.source).terminal_result() {
                None => waiting = true,
                Some(upstream) if upstream.status().is_failure() => {
                    self.inherit_failure(&upstream);
                    return;
                }
                Some(_) => {}
            }
        }

        if !waiting {
            self.fire(registry);
        }
    }

    /// Fail with the upstream's cause: its error by reference, or a plain timeout.
    fn inherit_failure(&self, upstream: &WorkResult<Dynamic>) {
        self.force_fail(NodeState::Init, upstream.error().cloned());
    }

    /// Execute the work unit if this call wins `Init → Working`.
    ///
    /// Returns false when another trigger already claimed the node.
    pub(crate) fn fire(&self, registry: &Registry) -> bool {
        if self
            .state
            .compare_exchange(
                NodeState::Init as u8,
                NodeState::Working as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return false;
        }

        #[cfg(feature = "tracing")]
        trace!(node = %self.id, "executing work unit");

        match self.unit.invoke(registry) {
            Ok(value) => {
                let settled =
                    self.settle(NodeState::Working, NodeState::Finished, WorkResult::success(value));

                if let Some(result) = settled {
                    #[cfg(feature = "tracing")]
                    debug!(node = %self.id, "finished");

                    self.unit.notify(true, &result);
                }
            }
            Err(err) => {
                self.force_fail(NodeState::Working, Some(err));
            }
        }

        true
    }

    /// Move `expected → Errored` and record a failure result.
    ///
    /// `None` records `Timeout`, `Some(err)` records `Exception`; both carry the work
    /// unit's default value. Returns false without side effects if the state was no
    /// longer `expected`.
    pub(crate) fn force_fail(&self, expected: NodeState, error: Option<TaskError>) -> bool {
        if self.state() != expected {
            return false;
        }

        let failure = WorkResult::failure(self.unit.default_value(), error);
        let Some(result) = self.settle(expected, NodeState::Errored, failure) else {
            return false;
        };

        #[cfg(feature = "tracing")]
        debug!(
            node = %self.id,
            status = %result.status(),
            error = ?result.error(),
            "force-failed"
        );

        self.unit.notify(false, &result);
        true
    }

    /// External stop signal: fail the node with a timeout unless it already settled.
    pub(crate) fn force_stop(&self) {
        loop {
            let state = self.state();
            if state.is_terminal() || self.force_fail(state, None) {
                return;
            }
        }
    }

    /// Terminal transition. The result is stored before the lock is released.
    fn settle(
        &self,
        expected: NodeState,
        next: NodeState,
        result: WorkResult<Dynamic>,
    ) -> Option<WorkResult<Dynamic>> {
        let mut slot = self.result.lock();
        if slot.is_some() {
            return None;
        }

        self.state
            .compare_exchange(
                expected as u8,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()?;

        *slot = Some(result.clone());
        Some(result)
    }

    /// Skip-ahead check: true when the single-successor chain after this node has
    /// already finished, making this node's work redundant.
    ///
    /// Only applies to nodes with exactly one continuation. The walk gives up at any
    /// node with several continuations.
    fn superseded(&self, graph: &Graph) -> bool {
        let [next] = self.next.as_slice() else {
            return false;
        };

        let mut cursor = graph.node_at(*next);
        loop {
            if cursor.state() != NodeState::Finished {
                return false;
            }
            match cursor.next.as_slice() {
                [] => return true,
                [only] => cursor = graph.node_at(*only),
                _ => return false,
            }
        }
    }

    fn fan_out(&self, scope: &Arc<RunScope>, entered: u64, remaining_ms: i64) {
        if self.next.is_empty() {
            return;
        }

        let elapsed = i64::try_from(scope.clock.elapsed_since(entered)).unwrap_or(i64::MAX);
        let budget = remaining_ms.saturating_sub(elapsed);

        // A chain stays on this thread.
        if let [only] = self.next.as_slice() {
            scope.graph().node_at(*only).run(scope, Some(self.index), budget);
            return;
        }

        let handles: Vec<_> = self
            .next
            .iter()
            .map(|&next| {
                let child = Arc::clone(scope);
                let from = self.index;
                submit(scope.pool.as_ref(), move || {
                    child.graph().node_at(next).run(&child, Some(from), budget);
                })
            })
            .collect();

        // Children cascade-timeout on their own; we only stop waiting for them.
        let wait = Duration::from_millis(u64::try_from(budget).unwrap_or(0));
        let settled = await_all(&handles, deadline_after(wait));

        #[cfg(feature = "tracing")]
        if !settled {
            debug!(
                node = %self.id,
                budget_ms = budget,
                "fan-out wait elapsed before all continuations settled"
            );
        }
        #[cfg(not(feature = "tracing"))]
        let _ = settled;
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("depends", &self.depends)
            .field("next", &self.next)
            .field("check_next_idle", &self.check_next_idle)
            .finish_non_exhaustive()
    }
}
