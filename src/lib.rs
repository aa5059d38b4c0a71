//! Bulwark: fault-tolerance guards for remote dependency calls
//!
//! # Overview
//!
//! This crate wraps calls to unreliable remote dependencies in a composed
//! set of guards so that failures degrade gracefully instead of cascading:
//!
//! - **Circuit Breaker**: Rate-based tripping over a sliding window of call
//!   outcomes, with a timed OPEN period and a bounded HALF_OPEN trial
//! - **Retry**: Bounded attempts with fixed or exponential backoff, gated by
//!   the breaker before every attempt and capped by an overall deadline
//! - **Bulkhead**: Per-target concurrency limits, as an inline semaphore or
//!   a queued worker pool with asynchronous completion handles
//! - **Fallback**: Substitute results for any guard failure, so callers get
//!   degraded answers rather than errors
//! - **Registry**: Lazy per-target guard instances plus a serializable
//!   status surface
//! - **Workflow**: A saga-style order pipeline demonstrating the guards
//!   composed across seven distinct targets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ GuardedInvoker::execute(target, op, fallback)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Bulkhead                          │  ← Bounded concurrency
//! │  (Semaphore slot or worker pool queue)  │
//! └─────────────┬───────────────────────────┘
//!               │ permit held for the whole call
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Loop                        │  ← Bounded attempts + backoff
//! │  (Overall deadline covers all attempts) │
//! └─────────────┬───────────────────────────┘
//!               │ before every attempt:
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (CLOSED / OPEN / HALF_OPEN, rate trip) │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         Remote Dependency
//!               │
//!          On guard failure:
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Fallback                          │  ← Degraded substitute
//! │  (Never recorded against the breaker)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use bulwark::{GuardedInvoker, GuardError, Registry, ResilienceConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), GuardError> {
//! let config = ResilienceConfig::from_toml_str(
//!     r#"
//!     [targets."payment-gateway".breaker]
//!     failure_rate_threshold = 40.0
//!     "#,
//! ).map_err(|e| GuardError::Remote(e.to_string()))?;
//!
//! let invoker = GuardedInvoker::new(Arc::new(Registry::from_config(config)));
//!
//! let balance = invoker
//!     .execute(
//!         "payment-gateway",
//!         || async {
//!             // Your potentially failing remote call
//!             Ok::<_, GuardError>(42_u64)
//!         },
//!         |_err| Ok(0),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bulkhead;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod invoker;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod workflow;

// Re-export main types for convenience
pub use bulkhead::{Bulkhead, BulkheadConfig, QueuedBulkhead, QueuedBulkheadConfig, TaskHandle};
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{ConfigError, ResilienceConfig, TargetConfig};
pub use error::GuardError;
pub use invoker::{BurstReport, GuardedInvoker};
pub use metrics::{CallOutcome, OutcomeKind, SlidingWindow};
pub use registry::{Registry, StatusReport, TargetGuards, TargetStatus};
pub use retry::{Backoff, RetryConfig, RetryPolicy};
pub use workflow::{OrderReport, OrderRequest, OrderServices, OrderWorkflow, WorkflowStatus};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use bulwark::prelude::*;
/// ```
pub mod prelude {
    pub use super::bulkhead::{Bulkhead, BulkheadConfig, QueuedBulkhead, TaskHandle};
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::config::ResilienceConfig;
    pub use super::error::GuardError;
    pub use super::invoker::GuardedInvoker;
    pub use super::registry::Registry;
    pub use super::retry::{Backoff, RetryConfig, RetryPolicy};
    pub use super::workflow::{OrderRequest, OrderServices, OrderWorkflow, WorkflowStatus};
}
