//! Worker pool seam used to run nodes concurrently.
//!
//! The engine only needs two capabilities from a pool: hand it a job, and wait for a set
//! of jobs until a deadline. [`WorkerPool`] covers the first; [`submit`] and
//! [`await_all`] build the second on top of a one-shot completion channel per job.
//!
//! Fan-out frames block a pool thread while they wait for their children, so the pool
//! must be wider than the graph's widest concurrent fan-out. [`PoolConfig::default`]
//! oversizes the pool for that reason.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

#[cfg(feature = "tracing")]
use tracing::error;

use crate::error::DagResult;

/// A unit of work handed to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs on other threads.
///
/// Implementations must eventually run every spawned job; a dropped job is treated as
/// finished by [`await_all`].
pub trait WorkerPool: Send + Sync {
    fn spawn(&self, job: Job);
}

impl WorkerPool for rayon::ThreadPool {
    fn spawn(&self, job: Job) {
        rayon::ThreadPool::spawn(self, job);
    }
}

/// Sizing and naming of a [`RayonPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub num_threads: usize,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cores = thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            num_threads: (cores * 4).max(16),
            thread_name_prefix: "graphrun-worker".to_string(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

/// [`WorkerPool`] backed by a dedicated rayon thread pool.
pub struct RayonPool {
    inner: rayon::ThreadPool,
    config: PoolConfig,
}

static SHARED: OnceLock<Arc<RayonPool>> = OnceLock::new();

impl RayonPool {
    /// Build a pool from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DagError::PoolBuild`](crate::DagError::PoolBuild) if rayon cannot spawn
    /// the threads.
    pub fn new(config: &PoolConfig) -> DagResult<Self> {
        let prefix = config.thread_name_prefix.clone();
        let mut builder = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(move |i| format!("{prefix}-{i}"));

        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }

        Ok(Self {
            inner: builder.build()?,
            config: config.clone(),
        })
    }

    /// Process-wide pool built from [`PoolConfig::default`] on first use.
    ///
    /// Opt-in only: nothing in the engine calls this implicitly.
    pub fn shared() -> DagResult<Arc<RayonPool>> {
        if let Some(pool) = SHARED.get() {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(RayonPool::new(&PoolConfig::default())?);
        Ok(Arc::clone(SHARED.get_or_init(|| pool)))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn num_threads(&self) -> usize {
        self.inner.current_num_threads()
    }
}

impl WorkerPool for RayonPool {
    fn spawn(&self, job: Job) {
        self.inner.spawn(job);
    }
}

impl std::fmt::Debug for RayonPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Completion signal of one submitted job.
#[derive(Debug)]
pub struct JobHandle {
    done: Receiver<()>,
}

impl JobHandle {
    /// Block until the job finished or `deadline` passed. Returns true if it finished.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        match self.done.recv_deadline(deadline) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// Run `f` on `pool` and return a handle that signals its completion.
///
/// Panics inside `f` are contained and logged; the handle still reports completion.
pub fn submit<P, F>(pool: &P, f: F) -> JobHandle
where
    P: WorkerPool + ?Sized,
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = bounded(1);

    pool.spawn(Box::new(move || {
        if let Err(_payload) = catch_unwind(AssertUnwindSafe(f)) {
            #[cfg(feature = "tracing")]
            error!(
                panic_message = %crate::error::panic_message(_payload.as_ref()),
                "pool job panicked"
            );
        }
        // The receiver may already have given up waiting.
        let _ = tx.send(());
    }));

    JobHandle { done: rx }
}

/// Wait for every handle until `deadline`. Returns true iff all jobs finished in time.
pub fn await_all(handles: &[JobHandle], deadline: Instant) -> bool {
    handles.iter().all(|handle| handle.wait_until(deadline))
}

/// `now + wait`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait)
        .or_else(|| now.checked_add(Duration::from_secs(60 * 60 * 24 * 365)))
        .unwrap_or(now)
}
