//! Bounded retry with backoff, gated by the circuit breaker
//!
//! Every attempt consults the target's circuit breaker first. A rejection
//! from an open circuit is propagated immediately and never retried —
//! retrying against an open circuit would defeat it. Attempt outcomes are
//! reported back to the breaker so its window reflects completion order.

use crate::circuit_breaker::CircuitBreaker;
use crate::error::GuardError;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Backoff schedule between retry attempts
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// Delay grows by `factor` per retry, capped at `max`
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay before the retry following the `attempt`-th failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                // Cap before converting: the scaled value can overflow what
                // Duration can represent long before u32 attempts run out.
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let scaled = initial.as_secs_f64() * factor.powi(exponent);
                Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first. Always bounded.
    pub max_attempts: u32,
    /// Backoff between attempts
    pub backoff: Backoff,
    /// Deadline covering all attempts combined, enforced by the invoker
    pub overall_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(100),
                factor: 2.0,
                max: Duration::from_secs(2),
            },
            overall_timeout: Duration::from_secs(10),
        }
    }
}

/// Re-invokes a failing operation a bounded number of times
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a retry policy with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration
    pub fn new_default() -> Self {
        Self::new(RetryConfig::default())
    }

    /// The configuration this policy was built with
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` under this policy against `breaker`.
    ///
    /// Transient failures are retried up to the configured bound, each
    /// outcome recorded against the breaker as it completes. Non-transient
    /// failures and circuit rejections propagate immediately. A backoff
    /// sleep never crosses the overall deadline; when the next delay would,
    /// the loop ends with [`GuardError::Timeout`] instead.
    pub async fn execute<T, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        mut op: F,
    ) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GuardError>>,
    {
        let deadline = Instant::now() + self.config.overall_timeout;
        let mut attempts = 0u32;
        loop {
            breaker.try_acquire().await?;

            let started = Instant::now();
            match op().await {
                Ok(value) => {
                    breaker.on_success(started.elapsed()).await;
                    return Ok(value);
                }
                Err(err) => {
                    if err.should_record() {
                        breaker.on_failure(started.elapsed()).await;
                    }
                    attempts += 1;

                    if !err.is_transient() {
                        return Err(err);
                    }
                    if attempts >= self.config.max_attempts {
                        return Err(GuardError::RetriesExhausted {
                            attempts,
                            last: Box::new(err),
                        });
                    }

                    let delay = self.config.backoff.delay_for(attempts);
                    // Never sleep past the overall deadline; every recorded
                    // outcome must belong to an attempt that actually ran.
                    if Instant::now() + delay >= deadline {
                        return Err(GuardError::Timeout(self.config.overall_timeout));
                    }
                    debug!(attempt = attempts, ?delay, error = %err, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
