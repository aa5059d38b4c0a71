//! Error types for guarded calls

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the guard pipeline or by guarded operations
#[derive(Debug, Error, Clone)]
pub enum GuardError {
    /// Circuit breaker is open, the call never reached the dependency
    #[error("circuit open, call rejected")]
    CircuitOpen,

    /// Bulkhead capacity (permits or queue) is exhausted
    #[error("bulkhead at capacity, call rejected")]
    BulkheadFull,

    /// The remote call ran and failed; eligible for retry
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The overall call deadline elapsed before a result arrived
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// Terminal failure after the bounded number of attempts
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GuardError>,
    },

    /// A fallback itself failed; indicates a defect in the fallback
    #[error("fallback failed: {0}")]
    FallbackFailed(String),
}

impl GuardError {
    /// Check if this error is transient and can be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, GuardError::Remote(_) | GuardError::Timeout(_))
    }

    /// Check if this error should be recorded in a circuit breaker window.
    ///
    /// Rejections never reached the dependency and say nothing about its
    /// health; fallback defects are local programming errors.
    pub fn should_record(&self) -> bool {
        !matches!(
            self,
            GuardError::CircuitOpen | GuardError::BulkheadFull | GuardError::FallbackFailed(_)
        )
    }
}
