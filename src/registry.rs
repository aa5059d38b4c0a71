//! Process-wide registry of per-target guard instances
//!
//! One breaker, retry policy, and bulkhead pair exists per distinct target
//! name, created lazily on first reference and living for the process
//! lifetime. Mutations for one target are serialized inside its own guards;
//! calls to different targets never contend.

use crate::bulkhead::{Bulkhead, QueuedBulkhead};
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::config::{ResilienceConfig, TargetConfig};
use crate::retry::RetryPolicy;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::debug;

/// The full guard set for one target. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct TargetGuards {
    pub breaker: CircuitBreaker,
    pub retry: RetryPolicy,
    pub bulkhead: Bulkhead,
    pub queued: QueuedBulkhead,
}

impl TargetGuards {
    fn build(name: &str, config: &TargetConfig) -> Self {
        debug!(target_name = %name, "creating guard set");
        Self {
            breaker: CircuitBreaker::new((&config.breaker).into()),
            retry: RetryPolicy::new((&config.retry).into()),
            bulkhead: Bulkhead::new(name, (&config.bulkhead).into()),
            queued: QueuedBulkhead::new(name, (&config.bulkhead).into()),
        }
    }
}

/// Lazily populated collection of named guard sets.
///
/// Queued bulkhead workers are spawned tasks, so guard sets must be first
/// referenced from within a Tokio runtime.
#[derive(Debug)]
pub struct Registry {
    config: ResilienceConfig,
    targets: RwLock<HashMap<String, TargetGuards>>,
}

/// Status of one target for the external status surface.
///
/// Rates are percentages; `-1.0` means not enough samples yet.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub state: &'static str,
    pub failure_rate: f64,
    pub slow_rate: f64,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
}

impl From<BreakerSnapshot> for TargetStatus {
    fn from(snapshot: BreakerSnapshot) -> Self {
        Self {
            state: snapshot.state,
            failure_rate: snapshot.failure_rate,
            slow_rate: snapshot.slow_rate,
            buffered_calls: snapshot.buffered_calls,
            failed_calls: snapshot.failed_calls,
            slow_calls: snapshot.slow_calls,
        }
    }
}

/// Aggregate count of targets per circuit state
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateCounts {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub half_open: usize,
}

/// Snapshot of every known target plus the aggregate counts
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub targets: BTreeMap<String, TargetStatus>,
    pub aggregate: StateCounts,
}

impl StatusReport {
    /// Emit the report as JSON for the external status surface
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Registry {
    /// Create a registry where every target uses default configuration
    pub fn new() -> Self {
        Self::from_config(ResilienceConfig::default())
    }

    /// Create a registry with defaults and per-target overrides
    pub fn from_config(config: ResilienceConfig) -> Self {
        Self {
            config,
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily create the guard set for a target.
    ///
    /// Idempotent: every call for the same name returns guards sharing the
    /// same underlying state.
    pub fn guards(&self, name: &str) -> TargetGuards {
        if let Some(guards) = self.targets.read().expect("registry lock poisoned").get(name) {
            return guards.clone();
        }
        let mut targets = self.targets.write().expect("registry lock poisoned");
        targets
            .entry(name.to_string())
            .or_insert_with(|| TargetGuards::build(name, self.config.for_target(name)))
            .clone()
    }

    /// The circuit breaker for a target
    pub fn circuit_breaker(&self, name: &str) -> CircuitBreaker {
        self.guards(name).breaker
    }

    /// The retry policy for a target
    pub fn retry_policy(&self, name: &str) -> RetryPolicy {
        self.guards(name).retry
    }

    /// The inline bulkhead for a target
    pub fn bulkhead(&self, name: &str) -> Bulkhead {
        self.guards(name).bulkhead
    }

    /// The queued bulkhead for a target
    pub fn queued_bulkhead(&self, name: &str) -> QueuedBulkhead {
        self.guards(name).queued
    }

    /// Names of all targets referenced so far
    pub fn target_names(&self) -> Vec<String> {
        let targets = self.targets.read().expect("registry lock poisoned");
        let mut names: Vec<String> = targets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Per-target status plus aggregate state counts
    pub async fn status_snapshot(&self) -> StatusReport {
        self.snapshot_filtered(None).await
    }

    /// Like [`Registry::status_snapshot`], restricted to the named targets.
    /// Names never referenced are absent from the report.
    pub async fn status_snapshot_for(&self, names: &[&str]) -> StatusReport {
        self.snapshot_filtered(Some(names)).await
    }

    async fn snapshot_filtered(&self, filter: Option<&[&str]>) -> StatusReport {
        let guards: Vec<(String, CircuitBreaker)> = {
            let targets = self.targets.read().expect("registry lock poisoned");
            targets
                .iter()
                .filter(|(name, _)| {
                    filter.map_or(true, |names| names.contains(&name.as_str()))
                })
                .map(|(name, guards)| (name.clone(), guards.breaker.clone()))
                .collect()
        };

        let mut report = StatusReport {
            targets: BTreeMap::new(),
            aggregate: StateCounts::default(),
        };
        for (name, breaker) in guards {
            let status: TargetStatus = breaker.snapshot().await.into();
            report.aggregate.total += 1;
            match status.state {
                "OPEN" => report.aggregate.open += 1,
                "HALF_OPEN" => report.aggregate.half_open += 1,
                _ => report.aggregate.closed += 1,
            }
            report.targets.insert(name, status);
        }
        report
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = Registry::new();

        let first = registry.guards("inventory-service");
        let second = registry.guards("inventory-service");

        // Clones share breaker state: a failure recorded through one is
        // visible through the other.
        first.breaker.on_failure(Duration::from_millis(1)).await;
        let snap = second.breaker.snapshot().await;
        assert_eq!(snap.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_targets_are_independent() {
        let registry = Registry::new();

        registry
            .circuit_breaker("a")
            .on_failure(Duration::from_millis(1))
            .await;

        let snap = registry.circuit_breaker("b").snapshot().await;
        assert_eq!(snap.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_per_target_config_override() {
        let toml = r#"
            [targets."payment-gateway".retry]
            max_attempts = 7
        "#;
        let registry =
            Registry::from_config(crate::config::ResilienceConfig::from_toml_str(toml).unwrap());

        assert_eq!(registry.retry_policy("payment-gateway").config().max_attempts, 7);
        assert_eq!(registry.retry_policy("redis-cache").config().max_attempts, 3);
    }

    #[tokio::test]
    async fn test_status_snapshot_aggregates() {
        let registry = Registry::new();
        registry.guards("a");
        registry.guards("b");
        registry.guards("c");

        let report = registry.status_snapshot().await;
        assert_eq!(report.aggregate.total, 3);
        assert_eq!(report.aggregate.closed, 3);
        assert_eq!(report.aggregate.open, 0);
        assert_eq!(report.targets["a"].state, "CLOSED");
        assert_eq!(report.targets["a"].failure_rate, -1.0);

        // Snapshot emits JSON for the external surface
        let json = report.to_json().unwrap();
        assert!(json.contains("\"failure_rate\": -1.0"));
        assert!(json.contains("\"aggregate\""));
    }

    #[tokio::test]
    async fn test_status_snapshot_filtered_by_name() {
        let registry = Registry::new();
        registry.guards("a");
        registry.guards("b");
        registry.guards("c");

        let report = registry.status_snapshot_for(&["a", "c", "never-seen"]).await;
        assert_eq!(report.aggregate.total, 2);
        assert!(report.targets.contains_key("a"));
        assert!(report.targets.contains_key("c"));
        assert!(!report.targets.contains_key("b"));
        assert!(!report.targets.contains_key("never-seen"));
    }

    #[tokio::test]
    async fn test_target_names_sorted() {
        let registry = Registry::new();
        registry.guards("zebra");
        registry.guards("alpha");
        assert_eq!(registry.target_names(), vec!["alpha", "zebra"]);
    }
}
