//! In-process DAG task orchestration with a global deadline.
//!
//! Build a graph of blocking work units, wire dependencies between them, and run the
//! whole graph on a worker pool under one overall deadline. Every node ends with a
//! [`WorkResult`] whose [`ResultStatus`] is `Success`, `Timeout` or `Exception`.
//!
//! # Features
//!
//! - **Required and optional edges**: a node with required dependencies waits for all of
//!   them to succeed and fails fast as soon as one fails. A node with only optional
//!   dependencies runs on the first one that settles.
//! - **Budget cascade**: the remaining time is threaded through every node. A node that
//!   sees an exhausted budget times out on its own, so a global timeout spreads through
//!   the graph without any cancellation signal.
//! - **Global force-stop**: when the deadline expires, every reachable node that has not
//!   settled is marked `Timeout` and [`Runner::execute`] returns immediately.
//! - **Skip-ahead**: a node whose single-successor chain has already finished is skipped
//!   instead of recomputing a result nobody will use (opt-out per node).
//! - **Local contention only**: each node owns an atomic state and its own result lock;
//!   nothing locks the whole graph.
//! - **Panic safety**: panics in work units and callbacks are caught and recorded.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use graphrun::{worker_fn, GraphBuilder, PoolConfig, RayonPool, ResultStatus, Runner, TaskSpec};
//!
//! let mut builder = GraphBuilder::new();
//!
//! let a = builder.add(TaskSpec::new(
//!     "a",
//!     worker_fn(|_: &(), _| Ok("x".to_string())),
//!     (),
//! ));
//! let b = builder.add(TaskSpec::new(
//!     "b",
//!     worker_fn(|_: &(), registry| {
//!         let upstream = registry.get::<String>("a")?;
//!         Ok(upstream.value().len())
//!     }),
//!     (),
//! ));
//! builder.depend(b, a, true).unwrap();
//!
//! let pool = RayonPool::new(&PoolConfig::default().with_num_threads(4)).unwrap();
//! let runner = Runner::new(Arc::new(pool));
//! let execution = runner.execute_graph(Duration::from_secs(1), builder.build()).unwrap();
//!
//! assert!(execution.completed());
//! let len = execution.result::<usize>("b").unwrap();
//! assert_eq!(len.status(), ResultStatus::Success);
//! assert_eq!(*len.value(), 1);
//! ```
//!
//! # Hazards
//!
//! - Graphs must be acyclic. Cycles are not detected and make a run never finish.
//! - Fan-out to several continuations blocks a pool thread until the children settle.
//!   Size the pool for the widest concurrent fan-out of your graph, or it can starve.
//! - Running work units are never interrupted. On timeout their results are discarded.

mod builder;
mod clock;
mod error;
mod graph;
mod node;
mod pool;
mod registry;
mod result;
mod runner;
mod task;
mod types;

pub use builder::{GraphBuilder, TaskSpec};
pub use clock::Clock;
pub use error::{BoxError, DagError, DagResult, TaskError};
pub use graph::Graph;
pub use node::TaskNode;
pub use pool::{await_all, submit, Job, JobHandle, PoolConfig, RayonPool, WorkerPool};
pub use registry::Registry;
pub use result::{ResultStatus, WorkResult};
pub use runner::{Execution, Runner};
pub use task::{callback_fn, worker_fn, Callback, FnCallback, FnWorker, NoopCallback, Worker};
pub use types::{DependencyEdge, NodeIndex, NodeState};
