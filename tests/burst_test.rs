//! Breaker behavior under bursts of concurrent guarded calls

use bulwark::error::GuardError;
use bulwark::invoker::GuardedInvoker;
use bulwark::registry::Registry;
use bulwark::ResilienceConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn invoker_with(toml: &str) -> GuardedInvoker {
    let config = ResilienceConfig::from_toml_str(toml).unwrap();
    GuardedInvoker::new(Arc::new(Registry::from_config(config)))
}

async fn trip_breaker(invoker: &GuardedInvoker, target: &str, calls: usize) {
    for _ in 0..calls {
        let _ = invoker
            .execute(
                target,
                || async { Err::<(), _>(GuardError::Remote("down".to_string())) },
                |_err| Ok(()),
            )
            .await;
    }
}

#[tokio::test]
async fn test_burst_against_open_circuit_never_reaches_dependency() {
    let invoker = invoker_with(
        r#"
        [default.retry]
        max_attempts = 1
        overall_timeout_ms = 2000

        [default.breaker]
        window_size = 4
        min_samples = 4
        wait_duration_ms = 60000
    "#,
    );

    trip_breaker(&invoker, "svc", 4).await;
    let status = invoker.registry().status_snapshot().await;
    assert_eq!(status.targets["svc"].state, "OPEN");

    let calls = Arc::new(AtomicU32::new(0));
    let gauge = calls.clone();
    let report = invoker
        .burst("svc", 5, move || {
            let calls = gauge.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GuardError>(())
            }
        })
        .await;

    assert_eq!(report.failure_count, 5);
    assert_eq!(report.success_count, 0);
    assert_eq!(report.success_rate, 0.0);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        0,
        "open circuit must short-circuit every call in the burst"
    );
}

#[tokio::test]
async fn test_breaker_recovers_through_half_open_trial() {
    let invoker = invoker_with(
        r#"
        [default.retry]
        max_attempts = 1
        overall_timeout_ms = 2000

        [default.breaker]
        window_size = 4
        min_samples = 4
        half_open_permits = 2
        wait_duration_ms = 50
    "#,
    );

    trip_breaker(&invoker, "svc", 4).await;
    assert_eq!(
        invoker.registry().status_snapshot().await.targets["svc"].state,
        "OPEN"
    );

    tokio::time::sleep(Duration::from_millis(80)).await;

    // Trial calls succeed one at a time, closing the circuit again
    for _ in 0..2 {
        let result = invoker
            .execute("svc", || async { Ok::<_, GuardError>(1) }, |_err| Ok(0))
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    let status = invoker.registry().status_snapshot().await;
    assert_eq!(status.targets["svc"].state, "CLOSED");

    // A healthy burst after recovery succeeds fully
    let report = invoker
        .burst("svc", 4, || async { Ok::<_, GuardError>(()) })
        .await;
    assert_eq!(report.success_count, 4);
    assert_eq!(report.success_rate, 100.0);
}

#[tokio::test]
async fn test_burst_mixed_outcomes_report() {
    let invoker = invoker_with(
        r#"
        [default.retry]
        max_attempts = 1
        overall_timeout_ms = 2000

        [default.breaker]
        min_samples = 10000
    "#,
    );

    let counter = Arc::new(AtomicU32::new(0));
    let gauge = counter.clone();
    let report = invoker
        .burst("svc", 10, move || {
            let counter = gauge.clone();
            async move {
                // Every other call fails
                if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    Ok::<_, GuardError>(())
                } else {
                    Err(GuardError::Remote("flaky".to_string()))
                }
            }
        })
        .await;

    assert_eq!(report.success_count, 5);
    assert_eq!(report.failure_count, 5);
    assert!((report.success_rate - 50.0).abs() < f64::EPSILON);
}
