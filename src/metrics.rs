//! Sliding window of recent call outcomes
//!
//! Each guarded target keeps a fixed-capacity ring of its most recent call
//! outcomes. Failure and slow-call rates are computed over the window
//! contents, but only once a minimum number of samples has accumulated —
//! a breaker must not trip on insufficient data.
//!
//! The window is not internally synchronized; the owning circuit breaker
//! serializes all access per target.

use std::collections::VecDeque;
use std::time::Duration;

/// How a single call attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Call succeeded within the slow-call threshold
    Success,
    /// Call succeeded but took at least the slow-call threshold
    Slow,
    /// Call failed
    Failure,
}

/// One recorded call attempt; immutable once recorded
#[derive(Debug, Clone, Copy)]
pub struct CallOutcome {
    pub kind: OutcomeKind,
    pub latency: Duration,
}

/// Fixed-capacity ring of the most recent call outcomes
#[derive(Debug)]
pub struct SlidingWindow {
    capacity: usize,
    min_samples: usize,
    buf: VecDeque<CallOutcome>,
    failed: usize,
    slow: usize,
}

impl SlidingWindow {
    /// Create a window holding at most `capacity` outcomes; rates are only
    /// reported once `min_samples` outcomes have been recorded.
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            min_samples,
            buf: VecDeque::with_capacity(capacity.max(1)),
            failed: 0,
            slow: 0,
        }
    }

    /// Append an outcome, evicting the oldest if at capacity. O(1).
    pub fn record(&mut self, outcome: CallOutcome) {
        if self.buf.len() == self.capacity {
            if let Some(evicted) = self.buf.pop_front() {
                match evicted.kind {
                    OutcomeKind::Failure => self.failed -= 1,
                    OutcomeKind::Slow => self.slow -= 1,
                    OutcomeKind::Success => {}
                }
            }
        }
        match outcome.kind {
            OutcomeKind::Failure => self.failed += 1,
            OutcomeKind::Slow => self.slow += 1,
            OutcomeKind::Success => {}
        }
        self.buf.push_back(outcome);
    }

    /// Failure rate in percent over the window, or `None` while fewer than
    /// `min_samples` outcomes have been recorded.
    pub fn failure_rate(&self) -> Option<f64> {
        if self.buf.len() < self.min_samples || self.buf.is_empty() {
            None
        } else {
            Some(self.failed as f64 * 100.0 / self.buf.len() as f64)
        }
    }

    /// Slow-call rate in percent over the window, or `None` while fewer than
    /// `min_samples` outcomes have been recorded.
    pub fn slow_rate(&self) -> Option<f64> {
        if self.buf.len() < self.min_samples || self.buf.is_empty() {
            None
        } else {
            Some(self.slow as f64 * 100.0 / self.buf.len() as f64)
        }
    }

    /// Number of outcomes currently buffered
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the window currently holds no outcomes
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Exact count of failed calls in the window
    pub fn failed_count(&self) -> usize {
        self.failed
    }

    /// Exact count of slow calls in the window
    pub fn slow_count(&self) -> usize {
        self.slow
    }

    /// Maximum number of outcomes the window holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
