//! Work unit and completion callback contracts.
//!
//! A node wraps one [`Worker`] (the function it runs), the worker's input, and one
//! [`Callback`] (notified when the node starts and when it reaches a terminal state).
//!
//! Internally the typed pieces are erased behind the crate-private `Unit` trait so that
//! nodes with different input and output types can live in the same graph arena. The
//! public API stays fully typed; erasure only happens at that trait boundary.

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

#[cfg(feature = "tracing")]
use tracing::error;

use crate::error::{BoxError, TaskError};
use crate::registry::Registry;
use crate::result::{Dynamic, WorkResult};

/// A unit of blocking work with a typed input and output.
///
/// `action` runs on a pool thread. It receives the node's input and the run-scoped
/// [`Registry`], through which it can read the result of any other node by id. It must
/// not retain the registry beyond the call. The input is only borrowed; the terminal
/// callback may read it concurrently with a still-running `action`, hence `Input: Sync`.
///
/// `default_value` is what the node reports when it times out, fails, or is skipped.
/// Downstream nodes see nothing else from a failed node, so give it a sane value.
///
/// # Examples
///
/// ```
/// use graphrun::{BoxError, Registry, Worker};
///
/// struct Fetch {
///     url: &'static str,
/// }
///
/// impl Worker for Fetch {
///     type Input = u32;
///     type Output = String;
///
///     fn action(&self, retries: &u32, _: &Registry) -> Result<String, BoxError> {
///         Ok(format!("{} ({} retries)", self.url, retries))
///     }
///
///     fn default_value(&self) -> String {
///         "offline".to_string()
///     }
/// }
/// ```
pub trait Worker: Send + Sync + 'static {
    type Input: Send + Sync + 'static;
    type Output: Clone + Default + Send + Sync + 'static;

    fn action(&self, input: &Self::Input, registry: &Registry) -> Result<Self::Output, BoxError>;

    fn default_value(&self) -> Self::Output {
        Self::Output::default()
    }
}

/// Hooks invoked around a node's execution.
///
/// `on_start` fires at most once, immediately before the work unit runs; it never fires
/// on a force-fail path. `on_terminal` fires exactly once per node that reached a
/// terminal state, with `success = false` for every failure kind.
pub trait Callback<T, V>: Send + Sync + 'static {
    fn on_start(&self) {}

    fn on_terminal(&self, _success: bool, _input: &T, _result: &WorkResult<V>) {}
}

/// Callback that does nothing. Used when a node is added without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl<T, V> Callback<T, V> for NoopCallback {}

impl<T, V, C> Callback<T, V> for Arc<C>
where
    C: Callback<T, V> + ?Sized,
{
    fn on_start(&self) {
        (**self).on_start()
    }

    fn on_terminal(&self, success: bool, input: &T, result: &WorkResult<V>) {
        (**self).on_terminal(success, input, result)
    }
}

/// Worker built from a closure. See [`worker_fn`].
pub struct FnWorker<I, O, F> {
    f: F,
    default: O,
    _phantom: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnWorker<I, O, F>
where
    O: Clone,
{
    /// Replace the value reported on failure (defaults to `O::default()`).
    pub fn with_default(mut self, default: O) -> Self {
        self.default = default;
        self
    }
}

impl<I, O, F> Worker for FnWorker<I, O, F>
where
    I: Send + Sync + 'static,
    O: Clone + Default + Send + Sync + 'static,
    F: Fn(&I, &Registry) -> Result<O, BoxError> + Send + Sync + 'static,
{
    type Input = I;
    type Output = O;

    fn action(&self, input: &I, registry: &Registry) -> Result<O, BoxError> {
        (self.f)(input, registry)
    }

    fn default_value(&self) -> O {
        self.default.clone()
    }
}

/// Convenience function to create a worker from a closure.
///
/// ```
/// use graphrun::{worker_fn, Worker};
///
/// let double = worker_fn(|x: &i32, _| Ok(x * 2)).with_default(-1);
/// assert_eq!(double.default_value(), -1);
/// ```
pub fn worker_fn<I, O, F>(f: F) -> FnWorker<I, O, F>
where
    I: Send + Sync + 'static,
    O: Clone + Default + Send + Sync + 'static,
    F: Fn(&I, &Registry) -> Result<O, BoxError> + Send + Sync + 'static,
{
    FnWorker {
        f,
        default: O::default(),
        _phantom: PhantomData,
    }
}

/// Callback built from a closure invoked on the terminal hook. See [`callback_fn`].
pub struct FnCallback<F>(F);

impl<T, V, F> Callback<T, V> for FnCallback<F>
where
    F: Fn(bool, &T, &WorkResult<V>) + Send + Sync + 'static,
{
    fn on_terminal(&self, success: bool, input: &T, result: &WorkResult<V>) {
        (self.0)(success, input, result)
    }
}

/// Convenience function to create a terminal-hook callback from a closure.
pub fn callback_fn<T, V, F>(f: F) -> FnCallback<F>
where
    F: Fn(bool, &T, &WorkResult<V>) + Send + Sync + 'static,
{
    FnCallback(f)
}

/// Type-erased view of a worker, its input and its callback.
///
/// This is the only place where type erasure occurs; `TypedUnit` knows the concrete
/// types and converts at the boundary.
pub(crate) trait Unit: Send + Sync {
    fn input_type(&self) -> &'static str;

    fn output_type(&self) -> &'static str;

    /// Run `on_start` and the work unit. Errors and panics become a [`TaskError`].
    fn invoke(&self, registry: &Registry) -> Result<Dynamic, TaskError>;

    fn default_value(&self) -> Dynamic;

    /// Run the terminal hook. Panics inside the hook are contained.
    fn notify(&self, success: bool, result: &WorkResult<Dynamic>);

    /// Swap the input while `still_open` holds.
    ///
    /// `still_open` is evaluated with the input exclusively locked. Never blocks: a
    /// running or notifying node holds the input and the swap is refused as sealed.
    fn replace_input(
        &self,
        input: Box<dyn Any + Send>,
        still_open: &dyn Fn() -> bool,
    ) -> Result<(), InputRejected>;
}

/// Why an input swap was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputRejected {
    Sealed,
    WrongType,
}

pub(crate) struct TypedUnit<W: Worker, C> {
    worker: W,
    callback: C,
    input: RwLock<W::Input>,
}

impl<W: Worker, C> TypedUnit<W, C> {
    pub(crate) fn new(worker: W, input: W::Input, callback: C) -> Self {
        Self {
            worker,
            callback,
            input: RwLock::new(input),
        }
    }
}

impl<W, C> Unit for TypedUnit<W, C>
where
    W: Worker,
    C: Callback<W::Input, W::Output>,
{
    fn input_type(&self) -> &'static str {
        type_name::<W::Input>()
    }

    fn output_type(&self) -> &'static str {
        type_name::<W::Output>()
    }

    fn invoke(&self, registry: &Registry) -> Result<Dynamic, TaskError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.callback.on_start();
            let input = self.input.read();
            self.worker.action(&input, registry)
        }));

        match outcome {
            Ok(Ok(value)) => Ok(Arc::new(value) as Dynamic),
            Ok(Err(err)) => Err(TaskError::from(err)),
            Err(payload) => Err(TaskError::from_panic(payload)),
        }
    }

    fn default_value(&self) -> Dynamic {
        Arc::new(self.worker.default_value())
    }

    fn notify(&self, success: bool, result: &WorkResult<Dynamic>) {
        let Some(typed) = result.downcast::<W::Output>() else {
            return;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let input = self.input.read();
            self.callback.on_terminal(success, &input, &typed);
        }));

        if let Err(_payload) = outcome {
            #[cfg(feature = "tracing")]
            error!(
                panic_message = %crate::error::panic_message(_payload.as_ref()),
                "terminal callback panicked"
            );
        }
    }

    fn replace_input(
        &self,
        input: Box<dyn Any + Send>,
        still_open: &dyn Fn() -> bool,
    ) -> Result<(), InputRejected> {
        let Some(mut slot) = self.input.try_write() else {
            return Err(InputRejected::Sealed);
        };
        if !still_open() {
            return Err(InputRejected::Sealed);
        }
        let input = input
            .downcast::<W::Input>()
            .map_err(|_| InputRejected::WrongType)?;
        *slot = *input;
        Ok(())
    }
}
