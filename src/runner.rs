//! Graph runner: submits the roots, waits for the global deadline, and force-stops
//! whatever is left when it expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{DagError, DagResult};
use crate::graph::Graph;
use crate::node::TaskNode;
use crate::pool::{await_all, deadline_after, submit, RayonPool, WorkerPool};
use crate::registry::{typed_result, Registry};
use crate::result::{ResultStatus, WorkResult};
use crate::types::NodeIndex;

/// Everything a node needs while it runs: the registry (which owns the graph), the pool
/// for fan-out and the clock for budget accounting.
pub(crate) struct RunScope {
    pub(crate) registry: Registry,
    pub(crate) pool: Arc<dyn WorkerPool>,
    pub(crate) clock: Arc<Clock>,
}

impl RunScope {
    pub(crate) fn graph(&self) -> &Graph {
        self.registry.graph()
    }
}

/// Executes graphs on a worker pool under a global deadline.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use graphrun::{worker_fn, GraphBuilder, PoolConfig, RayonPool, Runner, TaskSpec};
///
/// let mut builder = GraphBuilder::new();
/// let hello = builder.add(TaskSpec::new("hello", worker_fn(|_: &(), _| Ok("hi")), ()));
/// let graph = builder.build();
///
/// let pool = RayonPool::new(&PoolConfig::default().with_num_threads(4)).unwrap();
/// let runner = Runner::new(Arc::new(pool));
/// let execution = runner.execute(Duration::from_secs(1), graph, &[hello]).unwrap();
///
/// assert!(execution.completed());
/// assert_eq!(*execution.result::<&str>("hello").unwrap().value(), "hi");
/// ```
#[derive(Clone)]
pub struct Runner {
    pool: Arc<dyn WorkerPool>,
    clock: Arc<Clock>,
}

impl Runner {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            pool,
            clock: Clock::global(),
        }
    }

    /// Runner on the process-wide [`RayonPool::shared`] pool.
    pub fn with_shared_pool() -> DagResult<Self> {
        let pool: Arc<dyn WorkerPool> = RayonPool::shared()?;
        Ok(Self::new(pool))
    }

    /// Replace the clock used for budget accounting.
    pub fn with_clock(mut self, clock: Arc<Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run `graph` starting from `roots` and wait at most `deadline`.
    ///
    /// Returns once every reachable node is terminal or the deadline expired. On expiry
    /// every reachable node that has not settled is force-stopped with a `Timeout`;
    /// work units that are still running are not interrupted, their results are
    /// discarded when they return.
    ///
    /// With no roots nothing runs and the returned execution is not completed.
    ///
    /// # Errors
    ///
    /// - [`DagError::UnknownNode`] if a root is not part of `graph`
    /// - [`DagError::AlreadyExecuted`] if `graph` was executed before
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip(self, graph, roots),
            fields(
                roots = roots.len(),
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX)
            )
        )
    )]
    pub fn execute(
        &self,
        deadline: Duration,
        graph: Arc<Graph>,
        roots: &[NodeIndex],
    ) -> DagResult<Execution> {
        let started = Instant::now();

        if let Some(unknown) = roots.iter().find(|root| graph.node(**root).is_none()) {
            return Err(DagError::from(*unknown));
        }

        let scope = Arc::new(RunScope {
            registry: Registry::new(Arc::clone(&graph)),
            pool: Arc::clone(&self.pool),
            clock: Arc::clone(&self.clock),
        });

        if roots.is_empty() {
            #[cfg(feature = "tracing")]
            debug!("no roots given, nothing to run");

            return Ok(Execution::new(false, started.elapsed(), scope));
        }

        graph.claim()?;

        #[cfg(feature = "tracing")]
        info!(nodes = graph.len(), "starting graph execution");

        let budget = i64::try_from(deadline.as_millis()).unwrap_or(i64::MAX);
        let handles: Vec<_> = roots
            .iter()
            .map(|&root| {
                let scope = Arc::clone(&scope);
                submit(self.pool.as_ref(), move || {
                    scope.graph().node_at(root).run(&scope, None, budget);
                })
            })
            .collect();

        let completed = await_all(&handles, deadline_after(deadline));

        if !completed {
            let reachable = graph.reachable(roots);

            #[cfg(feature = "tracing")]
            warn!(
                nodes = reachable.len(),
                "deadline expired, force-stopping unfinished nodes"
            );

            for index in reachable {
                graph.node_at(index).force_stop();
            }
        }

        let elapsed = started.elapsed();

        #[cfg(feature = "tracing")]
        info!(
            completed,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "graph execution finished"
        );

        Ok(Execution::new(completed, elapsed, scope))
    }

    /// [`Runner::execute`] with every node without dependencies as a root.
    pub fn execute_graph(&self, deadline: Duration, graph: Arc<Graph>) -> DagResult<Execution> {
        let roots = graph.roots();
        self.execute(deadline, graph, &roots)
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Outcome of one [`Runner::execute`] call.
///
/// Per-node results are read through [`Execution::result`] or the [`Registry`].
pub struct Execution {
    completed: bool,
    elapsed: Duration,
    scope: Arc<RunScope>,
}

impl Execution {
    fn new(completed: bool, elapsed: Duration, scope: Arc<RunScope>) -> Self {
        Self {
            completed,
            elapsed,
            scope,
        }
    }

    /// True iff every reachable node settled before the deadline.
    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn registry(&self) -> &Registry {
        &self.scope.registry
    }

    pub fn graph(&self) -> &Arc<Graph> {
        self.scope.registry.graph()
    }

    /// Typed result of the node named `id`. See [`Registry::get`].
    ///
    /// Unlike the registry, this also finds nodes that were never triggered, such as
    /// descendants of a stuck node that the deadline stopped. With duplicate ids the
    /// registered node wins, then the last one added.
    ///
    /// # Errors
    ///
    /// - [`DagError::NodeNotFound`] if no node in the graph has this id
    /// - [`DagError::TypeMismatch`] if `V` is not the node's output type
    pub fn result<V: Clone + 'static>(&self, id: &str) -> DagResult<WorkResult<V>> {
        let node = self.node(id).ok_or_else(|| DagError::NodeNotFound {
            id: id.to_string(),
        })?;
        typed_result(node)
    }

    /// Status of the node named `id`, looked up like [`Execution::result`].
    pub fn status(&self, id: &str) -> Option<ResultStatus> {
        self.node(id).map(TaskNode::status)
    }

    fn node(&self, id: &str) -> Option<&TaskNode> {
        let graph = self.graph();
        self.scope
            .registry
            .node(id)
            .or_else(|| graph.index_of(id).and_then(|index| graph.node(index)))
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("completed", &self.completed)
            .field("elapsed", &self.elapsed)
            .field("registry", &self.scope.registry)
            .finish()
    }
}
