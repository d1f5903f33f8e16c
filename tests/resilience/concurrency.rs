//! Concurrency behavior across the stack: pool exclusivity, ordered batches,
//! and cancellation safety.

use super::test_utils::{builder_for, MockService, Step};
use std::sync::atomic::Ordering;
use std::time::Duration;
use strata_core::{DataError, QuerySpec};
use strata_pool::PoolConfig;
use strata_retry::{FixedDelay, RetryConfig};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_capacity_bounds_remote_concurrency() {
    let service = MockService::new();
    service.set_latency(Duration::from_millis(20));
    let executor = builder_for(&service)
        .pool(
            PoolConfig::builder()
                .max_connections(2)
                .acquire_timeout(Duration::from_millis(400))
                .build(),
        )
        .build();

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .query(&QuerySpec::table(format!("t{i}")).uncached())
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert_eq!(service.executes.load(Ordering::SeqCst), 10);
    // Never more in flight than the pool has connections, and no single
    // connection was ever leased to two callers at once.
    assert!(service.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(service.double_leases.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_results_come_back_in_input_order() {
    let service = MockService::new();
    service.set_latency(Duration::from_millis(5));
    let executor = builder_for(&service).build();

    let specs: Vec<QuerySpec> = (0..8)
        .map(|i| QuerySpec::table(format!("table{i}")))
        .collect();
    let results = executor.batch(&specs).await;

    assert_eq!(results.len(), specs.len());
    for (spec, result) in specs.iter().zip(results) {
        // The mock echoes the table name, so order mismatches are visible.
        let rows = result.unwrap();
        assert_eq!(rows.rows[0]["table"], spec.table.as_str());
    }
}

#[tokio::test]
async fn batch_elements_fail_independently() {
    let service = MockService::new();
    service.push(Step::Fail(DataError::validation("bad spec")));
    // A single connection forces sequential execution, so the scripted
    // failure lands on the first element.
    let executor = builder_for(&service)
        .pool(
            PoolConfig::builder()
                .max_connections(1)
                .acquire_timeout(Duration::from_millis(100))
                .build(),
        )
        .build();

    let results = executor
        .batch(&[
            QuerySpec::table("bad").uncached(),
            QuerySpec::table("good").uncached(),
        ])
        .await;
    assert!(matches!(results[0], Err(DataError::Validation { .. })));
    assert!(results[1].is_ok());
}

#[tokio::test]
async fn cancellation_stops_retries_and_returns_the_connection() {
    let service = MockService::new();
    service.fail_times(10, || DataError::transport("down"));
    let executor = builder_for(&service)
        .retry(
            RetryConfig::builder()
                .max_retries(5)
                .backoff(FixedDelay(Duration::from_secs(60)))
                .build(),
        )
        .build();

    let token = CancellationToken::new();
    let query = {
        let executor = executor.clone();
        let token = token.clone();
        tokio::spawn(async move {
            executor
                .query_with_cancel(&QuerySpec::table("users").uncached(), &token)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    let result = query.await.unwrap();

    // The first attempt's error comes back unwrapped, well before the
    // 60-second backoff would have elapsed.
    assert!(matches!(result.unwrap_err(), DataError::Transport { .. }));
    assert_eq!(service.executes.load(Ordering::SeqCst), 1);

    // The lease was returned on the way out.
    let stats = executor.stats();
    assert_eq!(stats.pool.active, 0);
    assert_eq!(stats.pool.idle, stats.pool.total);
}
