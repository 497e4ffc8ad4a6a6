//! Units of work accepted by the executor
//!
//! A task body is an async closure returning [`TaskResult`]. One-shot work
//! implements [`Callable`] (or [`Runnable`] when it produces no value).
//! Periodic work is an `FnMut` closure, called once per firing.
//!
//! Closures get these traits for free. [`callable`] and [`runnable`] box a
//! closure so that tasks of different closure types can share a `Vec` for
//! [`Executor::invoke_all`](crate::Executor::invoke_all) and
//! [`Executor::invoke_any`](crate::Executor::invoke_any).

use std::future::Future;

use futures::future::BoxFuture;

/// Error type a task body may fail with
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a task body
pub type TaskResult<T> = Result<T, BoxError>;

/// Boxed one-shot task producing `T`
pub type BoxCallable<T> = Box<dyn Callable<T>>;

/// Boxed one-shot task producing nothing
pub type BoxRunnable = Box<dyn Runnable>;

/// A zero-argument unit of work that runs once and yields a `T`
pub trait Callable<T>: Send + 'static {
    /// Consume the task and start its body
    fn call(self: Box<Self>) -> BoxFuture<'static, TaskResult<T>>;
}

impl<T, F, Fut> Callable<T> for F
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<T>> + Send + 'static,
{
    fn call(self: Box<Self>) -> BoxFuture<'static, TaskResult<T>> {
        Box::pin((*self)())
    }
}

/// A [`Callable`] that produces no value
pub trait Runnable: Callable<()> {}

impl<R: Callable<()>> Runnable for R {}

/// A unit of work invoked once per periodic firing
pub(crate) trait RepeatingTask: Send + 'static {
    /// Start one execution of the body
    fn run(&mut self) -> BoxFuture<'static, TaskResult<()>>;
}

impl<F, Fut> RepeatingTask for F
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<()>> + Send + 'static,
{
    fn run(&mut self) -> BoxFuture<'static, TaskResult<()>> {
        Box::pin(self())
    }
}

/// Box a closure as a [`Callable`]
///
/// ```
/// use cadence_executor::task::{callable, BoxCallable};
///
/// let tasks: Vec<BoxCallable<u32>> = vec![
///     callable(|| async { Ok(1) }),
///     callable(|| async { Err("no answer".into()) }),
/// ];
/// assert_eq!(tasks.len(), 2);
/// ```
pub fn callable<T, F, Fut>(task: F) -> BoxCallable<T>
where
    T: 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<T>> + Send + 'static,
{
    Box::new(task)
}

/// Box a closure as a [`Runnable`]
pub fn runnable<F, Fut>(task: F) -> BoxRunnable
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<()>> + Send + 'static,
{
    Box::new(task)
}
