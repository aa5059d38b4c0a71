//! Circuit breaker for guarded targets
//!
//! The circuit breaker prevents cascading failures by failing fast when a
//! dependency is unhealthy. It has three states:
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls rejected immediately
//! - HalfOpen: a bounded trial batch probes for recovery
//!
//! Trip decisions are rate-based over a [`SlidingWindow`] of recent call
//! outcomes rather than consecutive-failure counting: the breaker opens when
//! the failure rate or the slow-call rate over the window meets its
//! threshold, and only once a minimum number of samples has accumulated.

use crate::error::GuardError;
use crate::metrics::{CallOutcome, OutcomeKind, SlidingWindow};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open, calls are rejected until the wait duration elapses
    Open { opened_at: Instant },
    /// Circuit is half-open, a bounded trial batch is in flight
    HalfOpen,
}

impl CircuitState {
    /// Stable label for the status surface
    pub fn label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open { .. } => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate (percent) at or above which the circuit opens
    pub failure_rate_threshold: f64,
    /// Slow-call rate (percent) at or above which the circuit opens
    pub slow_rate_threshold: f64,
    /// Latency at or above which a call counts as slow, even on success
    pub slow_call_duration: Duration,
    /// Number of recent outcomes sampled while closed
    pub window_size: usize,
    /// Minimum samples before any rate is evaluated
    pub min_samples: usize,
    /// Duration to wait in open state before probing with a trial batch
    pub wait_duration: Duration,
    /// Number of calls permitted through during a half-open trial
    pub half_open_permits: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            slow_rate_threshold: 100.0,
            slow_call_duration: Duration::from_secs(2),
            window_size: 20,
            min_samples: 10,
            wait_duration: Duration::from_secs(10),
            half_open_permits: 5,
        }
    }
}

/// Internal state; all mutation happens behind one lock per breaker
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: SlidingWindow,
    /// Trial calls still allowed through while half-open
    half_open_remaining: usize,
}

/// Rate-based circuit breaker for a single guarded target
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<BreakerInner>>,
}

/// Point-in-time view of a breaker for status reporting.
///
/// Rates are percentages, with `-1.0` standing in for "insufficient data".
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerSnapshot {
    pub state: &'static str,
    pub failure_rate: f64,
    pub slow_rate: f64,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    ///
    /// `half_open_permits` is clamped to at least one; a trial batch that
    /// admits nothing could never report and the circuit would stay open
    /// forever.
    pub fn new(mut config: CircuitBreakerConfig) -> Self {
        config.half_open_permits = config.half_open_permits.max(1);
        let window = SlidingWindow::new(config.window_size, config.min_samples);
        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window,
                half_open_remaining: 0,
            })),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Ask whether a call may proceed.
    ///
    /// Open circuits reject with [`GuardError::CircuitOpen`] until the wait
    /// duration elapses; the first acquire after that transitions to
    /// half-open and is allowed through as part of the trial batch. Rejected
    /// calls never record an outcome.
    pub async fn try_acquire(&self) -> Result<(), GuardError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.wait_duration {
                    debug!("circuit transitioning from open to half-open");
                    inner.state = CircuitState::HalfOpen;
                    // Fresh trial window sized to the trial batch
                    inner.window = SlidingWindow::new(
                        self.config.half_open_permits,
                        self.config.half_open_permits,
                    );
                    // This acquire consumes the first trial permit
                    inner.half_open_remaining = self.config.half_open_permits.saturating_sub(1);
                    Ok(())
                } else {
                    Err(GuardError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_remaining > 0 {
                    inner.half_open_remaining -= 1;
                    Ok(())
                } else {
                    // Trial batch fully handed out; wait for it to report
                    Err(GuardError::CircuitOpen)
                }
            }
        }
    }

    /// Record a successful call. Latency at or above the slow-call threshold
    /// counts as slow even though the call succeeded.
    pub async fn on_success(&self, latency: Duration) {
        let kind = if latency >= self.config.slow_call_duration {
            OutcomeKind::Slow
        } else {
            OutcomeKind::Success
        };
        self.record(CallOutcome { kind, latency }).await;
    }

    /// Record a failed call
    pub async fn on_failure(&self, latency: Duration) {
        self.record(CallOutcome {
            kind: OutcomeKind::Failure,
            latency,
        })
        .await;
    }

    async fn record(&self, outcome: CallOutcome) {
        let mut inner = self.inner.lock().await;
        inner.window.record(outcome);

        match inner.state {
            CircuitState::Closed => {
                let breach = inner
                    .window
                    .failure_rate()
                    .is_some_and(|r| r >= self.config.failure_rate_threshold)
                    || inner
                        .window
                        .slow_rate()
                        .is_some_and(|r| r >= self.config.slow_rate_threshold);
                if breach {
                    warn!(
                        failed = inner.window.failed_count(),
                        slow = inner.window.slow_count(),
                        buffered = inner.window.len(),
                        "circuit opening: window rate breached threshold"
                    );
                    inner.state = CircuitState::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            CircuitState::HalfOpen => {
                // Evaluate only once the full trial batch has reported
                if inner.window.len() >= self.config.half_open_permits {
                    let n = inner.window.len() as f64;
                    let failure = inner.window.failed_count() as f64 * 100.0 / n;
                    let slow = inner.window.slow_count() as f64 * 100.0 / n;
                    if failure >= self.config.failure_rate_threshold
                        || slow >= self.config.slow_rate_threshold
                    {
                        warn!("trial batch failed, circuit re-opening");
                        inner.state = CircuitState::Open {
                            opened_at: Instant::now(),
                        };
                    } else {
                        debug!("trial batch healthy, circuit closing");
                        inner.state = CircuitState::Closed;
                        inner.window =
                            SlidingWindow::new(self.config.window_size, self.config.min_samples);
                    }
                }
            }
            // A call admitted before the trip may still complete afterwards;
            // its outcome lands in a window that is replaced on the next
            // transition, so nothing further to decide here.
            CircuitState::Open { .. } => {}
        }
    }

    /// Get the current state of the circuit breaker
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Point-in-time metrics for the status surface
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        BreakerSnapshot {
            state: inner.state.label(),
            failure_rate: inner.window.failure_rate().unwrap_or(-1.0),
            slow_rate: inner.window.slow_rate().unwrap_or(-1.0),
            buffered_calls: inner.window.len(),
            failed_calls: inner.window.failed_count(),
            slow_calls: inner.window.slow_count(),
        }
    }

    /// Force the breaker back to closed with an empty window
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = CircuitState::Closed;
        inner.window = SlidingWindow::new(self.config.window_size, self.config.min_samples);
        inner.half_open_remaining = 0;
    }

    /// The configuration this breaker was built with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Duration {
        Duration::from_millis(5)
    }

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: 50.0,
            slow_rate_threshold: 100.0,
            slow_call_duration: Duration::from_millis(200),
            window_size: 4,
            min_samples: 4,
            wait_duration: Duration::from_millis(50),
            half_open_permits: 2,
        }
    }

    async fn trip(breaker: &CircuitBreaker) {
        for _ in 0..4 {
            assert!(breaker.try_acquire().await.is_ok());
            breaker.on_failure(fast()).await;
        }
        assert!(matches!(
            breaker.state().await,
            CircuitState::Open { .. }
        ));
    }

    #[tokio::test]
    async fn test_stays_closed_below_min_samples() {
        let breaker = CircuitBreaker::new(test_config());

        // Three outright failures, but min_samples is four
        for _ in 0..3 {
            breaker.on_failure(fast()).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(breaker.try_acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_opens_on_failure_rate() {
        let breaker = CircuitBreaker::new(test_config());

        // 2 failures out of 4 = 50%, at threshold
        breaker.on_success(fast()).await;
        breaker.on_failure(fast()).await;
        breaker.on_success(fast()).await;
        breaker.on_failure(fast()).await;

        assert!(matches!(
            breaker.state().await,
            CircuitState::Open { .. }
        ));
    }

    #[tokio::test]
    async fn test_opens_on_slow_rate() {
        let config = CircuitBreakerConfig {
            slow_rate_threshold: 75.0,
            ..test_config()
        };
        let breaker = CircuitBreaker::new(config);

        // All successes, but slower than the slow-call threshold
        for _ in 0..4 {
            breaker.on_success(Duration::from_millis(300)).await;
        }
        assert!(matches!(
            breaker.state().await,
            CircuitState::Open { .. }
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_and_records_nothing() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker).await;

        let before = breaker.snapshot().await;
        for _ in 0..5 {
            assert!(matches!(
                breaker.try_acquire().await,
                Err(GuardError::CircuitOpen)
            ));
        }
        let after = breaker.snapshot().await;
        assert_eq!(before.buffered_calls, after.buffered_calls);
        assert_eq!(after.state, "OPEN");
    }

    #[tokio::test]
    async fn test_half_open_after_wait_and_permit_exhaustion() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker).await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        // First acquire transitions to half-open and is allowed
        assert!(breaker.try_acquire().await.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        // Second trial permit
        assert!(breaker.try_acquire().await.is_ok());

        // Permits exhausted; rejected until the trial batch reports
        assert!(matches!(
            breaker.try_acquire().await,
            Err(GuardError::CircuitOpen)
        ));
    }

    #[tokio::test]
    async fn test_trial_success_closes_with_reset_window() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        for _ in 0..2 {
            assert!(breaker.try_acquire().await.is_ok());
            breaker.on_success(fast()).await;
        }

        assert_eq!(breaker.state().await, CircuitState::Closed);
        let snap = breaker.snapshot().await;
        assert_eq!(snap.buffered_calls, 0, "window must reset on close");
        assert_eq!(snap.failure_rate, -1.0);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(breaker.try_acquire().await.is_ok());
        breaker.on_failure(fast()).await;
        assert!(breaker.try_acquire().await.is_ok());
        breaker.on_failure(fast()).await;

        assert!(matches!(
            breaker.state().await,
            CircuitState::Open { .. }
        ));
        // And it stays rejecting until the wait elapses again
        assert!(matches!(
            breaker.try_acquire().await,
            Err(GuardError::CircuitOpen)
        ));
    }

    #[tokio::test]
    async fn test_zero_half_open_permits_clamped_to_one() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            half_open_permits: 0,
            ..test_config()
        });
        trip(&breaker).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        // A single trial call is still admitted and its outcome decides
        assert!(breaker.try_acquire().await.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        assert!(matches!(
            breaker.try_acquire().await,
            Err(GuardError::CircuitOpen)
        ));

        breaker.on_success(fast()).await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_slow_success_counts_as_slow() {
        let breaker = CircuitBreaker::new(test_config());
        breaker.on_success(Duration::from_millis(300)).await;
        let snap = breaker.snapshot().await;
        assert_eq!(snap.slow_calls, 1);
        assert_eq!(snap.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker).await;

        breaker.reset().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(breaker.try_acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_keep_window_bounded() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            window_size: 8,
            min_samples: 8,
            failure_rate_threshold: 101.0, // never trips
            ..test_config()
        });

        let mut handles = Vec::new();
        for i in 0..32 {
            let b = breaker.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    b.on_success(Duration::from_millis(1)).await;
                } else {
                    b.on_failure(Duration::from_millis(1)).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snap = breaker.snapshot().await;
        assert_eq!(snap.buffered_calls, 8);
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
