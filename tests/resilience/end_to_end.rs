//! End-to-end scenarios through the full executor stack.

use super::test_utils::{builder_for, MockService, Step};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use strata_circuitbreaker::{BreakerConfig, CircuitState};
use strata_core::{DataError, Filter, QuerySpec};
use strata_pool::PoolConfig;
use strata_retry::{FixedDelay, RetryConfig};

#[tokio::test]
async fn cold_query_fetches_remotely_and_populates_the_cache() {
    let service = MockService::new();
    service.push(Step::Rows(vec![json!({"id": "u1", "name": "ada"})]));
    let executor = builder_for(&service).build();

    let rows = executor
        .query(&QuerySpec::table("users").filter(Filter::eq("id", "u1")))
        .await
        .unwrap();

    assert_eq!(rows.rows[0]["name"], "ada");
    assert_eq!(service.executes.load(Ordering::SeqCst), 1);
    let stats = executor.stats();
    assert_eq!(stats.cache.entries, 1);
    assert_eq!(stats.cache.misses, 1);
}

#[tokio::test]
async fn repeated_query_is_served_from_cache_without_a_remote_call() {
    let service = MockService::new();
    service.push(Step::Rows(vec![json!({"id": "u1"})]));
    let executor = builder_for(&service).build();
    let spec = QuerySpec::table("users").filter(Filter::eq("id", "u1"));

    let first = executor.query(&spec).await.unwrap();
    let second = executor.query(&spec).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(service.executes.load(Ordering::SeqCst), 1);
    assert_eq!(executor.stats().cache.hits, 1);

    // A logically identical spec written in a different filter order hits
    // the same entry.
    let reordered = QuerySpec::table("users").filter(Filter::eq("id", "u1"));
    executor.query(&reordered).await.unwrap();
    assert_eq!(service.executes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn five_consecutive_failures_open_the_circuit_and_fail_fast() {
    let service = MockService::new();
    service.fail_times(5, || DataError::transport("backend down"));
    let executor = builder_for(&service)
        .retry(RetryConfig::builder().max_retries(0).build())
        .circuit_breaker(
            BreakerConfig::builder()
                .failure_threshold(5)
                .reset_timeout(Duration::from_secs(30))
                .build(),
        )
        .build();
    let spec = QuerySpec::table("users").uncached();

    for _ in 0..5 {
        let err = executor.query(&spec).await.unwrap_err();
        assert!(matches!(err.last_error(), DataError::Transport { .. }));
    }
    assert_eq!(service.executes.load(Ordering::SeqCst), 5);
    assert_eq!(
        executor.stats().breakers["default"].state,
        CircuitState::Open
    );

    // Fail-fast: the rejection never touches the pool or the remote.
    let connects_before = service.connects.load(Ordering::SeqCst);
    let err = executor.query(&spec).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(service.executes.load(Ordering::SeqCst), 5);
    assert_eq!(service.connects.load(Ordering::SeqCst), connects_before);
}

#[tokio::test]
async fn open_circuit_heals_through_a_probe() {
    let service = MockService::new();
    service.fail_times(2, || DataError::transport("backend down"));
    let executor = builder_for(&service)
        .retry(RetryConfig::builder().max_retries(0).build())
        .circuit_breaker(
            BreakerConfig::builder()
                .failure_threshold(2)
                .reset_timeout(Duration::from_millis(100))
                .build(),
        )
        .build();
    let spec = QuerySpec::table("users").uncached();

    for _ in 0..2 {
        let _ = executor.query(&spec).await.unwrap_err();
    }
    assert!(executor.query(&spec).await.unwrap_err().is_circuit_open());

    // After the reset timeout the next call runs as a probe; the scripted
    // failures are spent, so it succeeds and closes the breaker.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(executor.query(&spec).await.is_ok());
    assert_eq!(
        executor.stats().breakers["default"].state,
        CircuitState::Closed
    );
}

#[tokio::test]
async fn invalidation_forces_the_next_read_back_to_the_remote() {
    let service = MockService::new();
    let executor = builder_for(&service).build();
    let spec = QuerySpec::table("orders").filter(Filter::eq("id", "o1"));

    executor.query(&spec).await.unwrap();
    executor.query(&spec).await.unwrap();
    assert_eq!(service.executes.load(Ordering::SeqCst), 1);

    assert_eq!(executor.invalidate("orders", Some("o1")), 1);
    executor.query(&spec).await.unwrap();
    assert_eq!(service.executes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn a_write_through_the_executor_invalidates_its_entity() {
    let service = MockService::new();
    let executor = builder_for(&service).build();
    let spec = QuerySpec::table("orders").filter(Filter::eq("id", "o1"));

    executor.query(&spec).await.unwrap();
    service.push(Step::Affected(1));
    executor
        .update(
            "orders",
            vec![Filter::eq("id", "o1")],
            json!({"status": "shipped"}),
        )
        .await
        .unwrap();

    executor.query(&spec).await.unwrap();
    // Initial read, write, re-read.
    assert_eq!(service.executes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn pool_exhaustion_surfaces_as_a_typed_error() {
    let service = MockService::new();
    service.set_latency(Duration::from_millis(300));
    let executor = builder_for(&service)
        .pool(
            PoolConfig::builder()
                .max_connections(1)
                .acquire_timeout(Duration::from_millis(100))
                .build(),
        )
        .retry(RetryConfig::builder().max_retries(0).build())
        .build();

    let slow = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .query(&QuerySpec::table("slow").uncached())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = executor
        .query(&QuerySpec::table("fast").uncached())
        .await
        .unwrap_err();
    match err {
        DataError::PoolExhausted { waited } => {
            assert!(waited >= Duration::from_millis(100));
        }
        other => panic!("expected PoolExhausted, got {other:?}"),
    }

    assert!(slow.await.unwrap().is_ok());
}

#[tokio::test]
async fn rate_limit_hints_delay_the_retry_and_then_succeed() {
    let service = MockService::new();
    service.push(Step::Fail(DataError::RateLimited {
        retry_after: Some(Duration::from_millis(50)),
    }));
    let executor = builder_for(&service)
        .retry(
            RetryConfig::builder()
                .max_retries(1)
                .backoff(FixedDelay(Duration::from_millis(1)))
                .build(),
        )
        .build();

    let started = std::time::Instant::now();
    let rows = executor
        .query(&QuerySpec::table("users").uncached())
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 1);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(service.executes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn init_and_shutdown_manage_the_background_lifecycle() {
    let service = MockService::new();
    let executor = builder_for(&service).build();

    executor.init().await.unwrap();
    assert_eq!(executor.stats().pool.total, 1);

    executor.query(&QuerySpec::table("users")).await.unwrap();
    executor.shutdown().await;

    assert_eq!(executor.stats().pool.total, 0);
    assert!(executor
        .query(&QuerySpec::table("users").uncached())
        .await
        .unwrap_err()
        .is_pool_exhausted());
}
