//! Guarded call composition
//!
//! [`GuardedInvoker`] is the single call contract every dependent call goes
//! through: bulkhead admission, then retry gated by the circuit breaker,
//! then fallback substitution for any guard failure. The bulkhead permit is
//! held for the whole pipeline and released exactly once on every exit path
//! via RAII.
//!
//! An overall deadline from the target's retry configuration covers all
//! attempts combined, so a target with generous per-attempt latencies cannot
//! stall a bulkhead slot indefinitely.

use crate::bulkhead::TaskHandle;
use crate::error::GuardError;
use crate::registry::{Registry, TargetGuards};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Composes bulkhead, circuit breaker, retry, and fallback into one call
#[derive(Debug, Clone)]
pub struct GuardedInvoker {
    registry: Arc<Registry>,
}

/// Aggregate of one burst of concurrent guarded calls
#[derive(Debug, Clone, Serialize)]
pub struct BurstReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// Percentage of calls that succeeded
    pub success_rate: f64,
}

impl GuardedInvoker {
    /// Create an invoker over a shared registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry backing this invoker
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Core guard pipeline without fallback substitution:
    /// bulkhead admission, then retry gated by the breaker, all under the
    /// target's overall deadline.
    async fn guarded<T, F, Fut>(&self, target: &str, op: F) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GuardError>>,
    {
        let guards = self.registry.guards(target);
        let _permit = guards.bulkhead.acquire().await?;
        Self::attempt_all(&guards, op).await
        // permit drops here on every path
    }

    async fn attempt_all<T, F, Fut>(guards: &TargetGuards, op: F) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GuardError>>,
    {
        let overall = guards.retry.config().overall_timeout;
        match tokio::time::timeout(overall, guards.retry.execute(&guards.breaker, op)).await {
            Ok(result) => result,
            Err(_) => {
                // The slot was held for the full deadline and the dependency
                // never answered; that counts against its window.
                guards.breaker.on_failure(overall).await;
                Err(GuardError::Timeout(overall))
            }
        }
    }

    /// Execute a guarded call, substituting `fallback` for any guard failure.
    ///
    /// Rejections (circuit open, bulkhead full), exhausted retries, and
    /// deadline expiry are all resolved by the fallback and never surfaced.
    /// A fallback that itself fails becomes [`GuardError::FallbackFailed`]
    /// and propagates — that is a defect in the fallback, not a dependency
    /// failure, and is never recorded against the breaker.
    pub async fn execute<T, F, Fut, FB>(
        &self,
        target: &str,
        op: F,
        fallback: FB,
    ) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GuardError>>,
        FB: FnOnce(&GuardError) -> Result<T, GuardError>,
    {
        match self.guarded(target, op).await {
            Ok(value) => Ok(value),
            Err(err @ GuardError::FallbackFailed(_)) => Err(err),
            Err(err) => {
                warn!(target_name = %target, error = %err, "guarded call failed, applying fallback");
                fallback(&err).map_err(|fe| GuardError::FallbackFailed(fe.to_string()))
            }
        }
    }

    /// Execute a guarded call asynchronously on the target's queued bulkhead.
    ///
    /// Returns immediately with a handle that resolves once; queue
    /// saturation at submit time resolves the handle with the fallback right
    /// away. The retry/breaker/fallback semantics inside the pool match
    /// [`GuardedInvoker::execute`].
    pub fn execute_queued<T, F, Fut, FB>(
        &self,
        target: &str,
        op: F,
        fallback: FB,
    ) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, GuardError>> + Send + 'static,
        FB: Fn(&GuardError) -> Result<T, GuardError> + Send + Sync + 'static,
    {
        let guards = self.registry.guards(target);
        let fallback = Arc::new(fallback);

        let target_name = target.to_string();
        let job_guards = guards.clone();
        let job_fallback = Arc::clone(&fallback);
        let job = async move {
            match Self::attempt_all(&job_guards, op).await {
                Ok(value) => Ok(value),
                Err(err @ GuardError::FallbackFailed(_)) => Err(err),
                Err(err) => {
                    warn!(target_name = %target_name, error = %err, "queued guarded call failed, applying fallback");
                    job_fallback(&err).map_err(|fe| GuardError::FallbackFailed(fe.to_string()))
                }
            }
        };

        match guards.queued.submit(job) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(target_name = %target, "queued bulkhead saturated at submit, applying fallback");
                TaskHandle::ready(
                    fallback(&err).map_err(|fe| GuardError::FallbackFailed(fe.to_string())),
                )
            }
        }
    }

    /// Issue `count` concurrent guarded calls against one target and
    /// aggregate the outcomes. Useful for exercising breaker transitions
    /// under load.
    pub async fn burst<T, F, Fut>(&self, target: &str, count: usize, op: F) -> BurstReport
    where
        T: Send + 'static,
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, GuardError>> + Send + 'static,
    {
        let mut tasks = Vec::with_capacity(count);
        for _ in 0..count {
            let invoker = self.clone();
            let target = target.to_string();
            let op = op.clone();
            tasks.push(tokio::spawn(async move {
                invoker.guarded(&target, op).await.is_ok()
            }));
        }

        let mut success_count = 0;
        let mut failure_count = 0;
        for task in tasks {
            match task.await {
                Ok(true) => success_count += 1,
                _ => failure_count += 1,
            }
        }

        let success_rate = if count == 0 {
            0.0
        } else {
            success_count as f64 * 100.0 / count as f64
        };
        BurstReport {
            success_count,
            failure_count,
            success_rate,
        }
    }
}
