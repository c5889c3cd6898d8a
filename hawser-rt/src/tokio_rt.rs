//! Tokio-based multi-thread executor implementation.

use core_affinity::{set_for_current, CoreId};
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

/// A handle to a spawned task.
///
/// This is a wrapper around tokio's `JoinHandle` that provides detach and
/// cancel operations alongside awaiting the result.
///
/// When awaited, returns `Result<T, TaskError>`:
/// - `Ok(T)`: the task completed successfully
/// - `Err(TaskError)`: the task panicked or was cancelled
pub struct Task<T> {
    inner: tokio::task::JoinHandle<T>,
}

impl<T> Future for Task<T> {
    type Output = std::result::Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|result| result.map_err(|e| TaskError { inner: e }))
    }
}

impl<T> Task<T> {
    /// Detaches the task, allowing it to run in the background.
    ///
    /// This consumes the task handle; the task runs to completion without
    /// being awaited.
    pub fn detach(self) {
        drop(self.inner);
    }

    /// Cancels the task, aborting its execution at the next await point.
    pub fn cancel(self) {
        self.inner.abort();
    }
}

/// Error returned when a spawned task fails.
///
/// This can occur when the task panics or is cancelled.
#[derive(Debug)]
pub struct TaskError {
    inner: tokio::task::JoinError,
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {}

/// A factory that configures and runs a tokio multi-thread runtime.
#[derive(Debug, Default)]
pub struct ExecutorBuilder {
    workers: Option<usize>,
    core_ids: Vec<CoreId>,
    name: String,
}

impl ExecutorBuilder {
    /// Creates a new ExecutorBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the worker threads-to-be. The name shows up in panic messages
    /// and thread listings.
    pub fn name(mut self, name: &str) -> Self {
        self.name = String::from(name);
        self
    }

    /// Sets the number of worker threads. Defaults to the number of CPU
    /// cores, or to the number of pinned cores when [`core_ids`](Self::core_ids)
    /// is used.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Pins worker threads to the given CPU cores, round-robin.
    pub fn core_ids(mut self, core_ids: Vec<CoreId>) -> Self {
        self.core_ids = core_ids;
        self
    }

    /// Runs the executor on the current thread until the given future
    /// completes, driving it with the configured worker pool.
    pub fn run<T>(self, f: impl Future<Output = T>) -> T {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();
        if !self.name.is_empty() {
            builder.thread_name(self.name);
        }
        if let Some(workers) = self.workers {
            builder.worker_threads(workers);
        } else if !self.core_ids.is_empty() {
            builder.worker_threads(self.core_ids.len());
        }
        if !self.core_ids.is_empty() {
            let core_ids = Arc::new(self.core_ids);
            let next = Arc::new(AtomicUsize::new(0));
            builder.on_thread_start(move || {
                let i = next.fetch_add(1, Ordering::Relaxed) % core_ids.len();
                set_for_current(core_ids[i]);
            });
        }
        let rt = builder.build().expect("Failed to build tokio runtime");
        rt.block_on(f)
    }
}

/// Spawns a task onto the current executor.
///
/// Returns a [`Task<T>`] that can be awaited for the result, detached, or
/// cancelled.
///
/// # Panics
///
/// Panics if called outside of a runtime context.
pub fn spawn<T: Send + 'static>(future: impl Future<Output = T> + Send + 'static) -> Task<T> {
    Task {
        inner: tokio::spawn(future),
    }
}

/// Yields to allow other tasks on the executor to run.
pub async fn yield_now() {
    tokio::task::yield_now().await
}
