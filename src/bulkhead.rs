//! Bulkheads: bounded concurrency per guarded target
//!
//! Two variants, selected per target:
//! - [`Bulkhead`]: a counting semaphore wrapped so every admitted call holds
//!   a [`BulkheadPermit`] released exactly once on every exit path.
//! - [`QueuedBulkhead`]: a bounded worker pool with a bounded submission
//!   queue; execution is asynchronous and resolved through a [`TaskHandle`].
//!
//! Saturation of either variant is [`GuardError::BulkheadFull`], a distinct,
//! non-retryable failure kind from a remote-call failure.

use crate::error::GuardError;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Configuration for the inline (semaphore) bulkhead
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum concurrent in-flight calls
    pub max_concurrent: usize,
    /// How long to wait for a slot; `None` rejects immediately at capacity
    pub acquire_timeout: Option<Duration>,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            acquire_timeout: Some(Duration::from_millis(500)),
        }
    }
}

/// A lease on one of a target's concurrency slots.
///
/// The slot is returned when the permit drops, which makes release happen
/// exactly once on every exit path (success, failure, or fallback).
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

/// Semaphore-backed concurrency limit for one target.
///
/// Cheap to clone; clones share the same slots.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
}

impl Bulkhead {
    /// Create a bulkhead for a named target
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            name: name.into(),
            config,
            semaphore,
        }
    }

    /// Acquire a concurrency slot, waiting up to the configured timeout.
    ///
    /// Fails with [`GuardError::BulkheadFull`] at capacity (immediately, or
    /// after the bounded wait — never unbounded blocking).
    pub async fn acquire(&self) -> Result<BulkheadPermit, GuardError> {
        let semaphore = Arc::clone(&self.semaphore);
        match self.config.acquire_timeout {
            None => semaphore
                .try_acquire_owned()
                .map(|permit| BulkheadPermit { _permit: permit })
                .map_err(|_| {
                    debug!(bulkhead = %self.name, "bulkhead saturated, rejecting");
                    GuardError::BulkheadFull
                }),
            Some(wait) => match tokio::time::timeout(wait, semaphore.acquire_owned()).await {
                Ok(Ok(permit)) => Ok(BulkheadPermit { _permit: permit }),
                Ok(Err(_)) | Err(_) => {
                    debug!(bulkhead = %self.name, "bulkhead saturated, rejecting after wait");
                    Err(GuardError::BulkheadFull)
                }
            },
        }
    }

    /// Slots currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Maximum concurrent calls this bulkhead admits
    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Name of the target this bulkhead guards
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Configuration for the queued (worker pool) bulkhead
#[derive(Debug, Clone)]
pub struct QueuedBulkheadConfig {
    /// Number of worker tasks executing submitted jobs
    pub worker_count: usize,
    /// Bounded submission queue depth beyond the busy workers
    pub queue_capacity: usize,
}

impl Default for QueuedBulkheadConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_capacity: 8,
        }
    }
}

type Job = BoxFuture<'static, ()>;

/// Bounded worker pool with a bounded queue.
///
/// Submissions beyond queue capacity fail fast with
/// [`GuardError::BulkheadFull`]. Concurrency never exceeds `worker_count`.
/// Must be created inside a Tokio runtime (workers are spawned tasks).
///
/// Cheap to clone; clones submit into the same pool.
#[derive(Debug, Clone)]
pub struct QueuedBulkhead {
    name: String,
    tx: mpsc::Sender<Job>,
}

impl QueuedBulkhead {
    /// Create a worker pool for a named target
    pub fn new(name: impl Into<String>, config: QueuedBulkheadConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for _ in 0..config.worker_count.max(1) {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    // Lock only around the dequeue; execution runs unlocked
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
            });
        }

        Self {
            name: name.into(),
            tx,
        }
    }

    /// Submit an operation for asynchronous execution.
    ///
    /// Returns a [`TaskHandle`] resolving with the operation's result, or
    /// [`GuardError::BulkheadFull`] if the queue is saturated.
    pub fn submit<T, F>(&self, fut: F) -> Result<TaskHandle<T>, GuardError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, GuardError>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = fut.await;
            // Receiver may have been dropped; nothing to do then
            let _ = done_tx.send(result);
        });

        self.tx.try_send(job).map_err(|_| {
            debug!(bulkhead = %self.name, "queued bulkhead saturated, rejecting submission");
            GuardError::BulkheadFull
        })?;

        Ok(TaskHandle {
            inner: HandleInner::Pending(done_rx),
        })
    }

    /// Name of the target this pool guards
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
enum HandleInner<T> {
    Ready(Result<T, GuardError>),
    Pending(oneshot::Receiver<Result<T, GuardError>>),
}

/// Single-resolution handle to an asynchronously executing guarded call.
///
/// Consumed exactly once by [`TaskHandle::join`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: HandleInner<T>,
}

impl<T> TaskHandle<T> {
    /// A handle that is already resolved
    pub fn ready(result: Result<T, GuardError>) -> Self {
        Self {
            inner: HandleInner::Ready(result),
        }
    }

    /// Await the single resolution of this handle
    pub async fn join(self) -> Result<T, GuardError> {
        match self.inner {
            HandleInner::Ready(result) => result,
            HandleInner::Pending(rx) => rx.await.unwrap_or_else(|_| {
                Err(GuardError::Remote(
                    "guarded task dropped before completion".to_string(),
                ))
            }),
        }
    }
}
