//! The resilient query executor.
//!
//! [`QueryExecutor`] composes the strata components into one data-access
//! facade. A read flows cache → circuit breaker → retry → connection pool →
//! remote service, and a successful remote read populates the cache under its
//! canonical key and tags. Writes take the same resilient path and then
//! invalidate the tags they touched, so a read after a write never serves the
//! stale entry.
//!
//! All failures surface as typed [`DataError`]s. The layered deadlines nest
//! (pool acquire inside the per-call timeout inside the overall timeout), and
//! the builder refuses configurations where they do not.
//!
//! # Examples
//!
//! ```no_run
//! use strata_core::{Filter, QuerySpec};
//! use strata_executor::ExecutorBuilder;
//! # use strata_pool::Connector;
//! # use strata_core::DataError;
//! # async fn example(connector: std::sync::Arc<dyn Connector>) -> Result<(), DataError> {
//! let executor = ExecutorBuilder::new(connector)
//!     .preferred_region("us-east-1")
//!     .build();
//! executor.init().await?;
//!
//! let users = executor
//!     .query(
//!         &QuerySpec::table("users")
//!             .filter(Filter::eq("status", "active"))
//!             .page(50, 0),
//!     )
//!     .await?;
//! println!("{} active users", users.rows.len());
//!
//! executor.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::ExecutorBuilder;

use futures::future::join_all;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strata_cache::{CacheStats, CacheStore, CacheWriteOptions};
use strata_circuitbreaker::{BreakerRegistry, BreakerStats};
use strata_core::{
    cache_key, cache_tags, entity_tags, DataError, ExecutionResult, Filter, QuerySpec, ResultSet,
    Statement,
};
use strata_pool::{Pool, PoolStats};
use strata_retry::RetryPolicy;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

/// Aggregated observability snapshot across every composed component.
#[derive(Debug, Clone)]
pub struct ExecutorStats {
    /// Cache store counters.
    pub cache: CacheStats,
    /// Connection pool occupancy and counters.
    pub pool: PoolStats,
    /// Circuit breaker state per upstream target.
    pub breakers: HashMap<String, BreakerStats>,
    /// Scheduled retries by error kind.
    pub retries: HashMap<&'static str, u64>,
}

pub(crate) struct ExecutorInner {
    pub(crate) cache: Arc<CacheStore>,
    pub(crate) pool: Pool,
    pub(crate) breakers: BreakerRegistry,
    pub(crate) retry: RetryPolicy,
    pub(crate) preferred_region: Option<String>,
    pub(crate) call_timeout: Duration,
    pub(crate) overall_timeout: Duration,
    pub(crate) sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// The data-access facade. Cheap to clone; clones share every component.
#[derive(Clone)]
pub struct QueryExecutor {
    pub(crate) inner: Arc<ExecutorInner>,
}

impl QueryExecutor {
    /// Warms the pool and starts the background tasks (pool health checker,
    /// cache sweeper). Call once after construction.
    pub async fn init(&self) -> Result<(), DataError> {
        let inner = &self.inner;
        inner.pool.warm_up().await?;
        inner.pool.spawn_health_checker();

        let handle = inner.cache.spawn_sweeper();
        if let Some(previous) = inner.sweeper.lock().unwrap().replace(handle) {
            previous.abort();
        }

        #[cfg(feature = "tracing")]
        info!(region = ?inner.preferred_region, "executor initialized");
        Ok(())
    }

    /// Drains the pool and stops the background tasks. In-flight calls get
    /// the pool's drain timeout to finish.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.pool.drain().await;
        if let Some(handle) = inner.sweeper.lock().unwrap().take() {
            handle.abort();
        }

        #[cfg(feature = "tracing")]
        info!("executor shut down");
    }

    /// Runs a read query: cache first, then the resilient remote path.
    pub async fn query(&self, spec: &QuerySpec) -> Result<ResultSet, DataError> {
        self.query_with_cancel(spec, &CancellationToken::new())
            .await
    }

    /// Like [`query`](Self::query), but stops scheduling retries once `token`
    /// is cancelled. The connection in use is still returned to the pool.
    pub async fn query_with_cancel(
        &self,
        spec: &QuerySpec,
        token: &CancellationToken,
    ) -> Result<ResultSet, DataError> {
        let key = spec.cacheable.then(|| cache_key(spec));
        if let Some(key) = &key {
            if let Some(rows) = self.inner.cache.get::<ResultSet>(key) {
                #[cfg(feature = "metrics")]
                counter!("executor_queries_total", "source" => "cache").increment(1);

                #[cfg(feature = "tracing")]
                debug!(table = %spec.table, "query served from cache");
                return Ok(rows);
            }
        }

        let statement = Statement::Query(spec.clone());
        let rows = self.call_remote(&statement, token).await?.into_rows()?;

        if let Some(key) = &key {
            self.inner
                .cache
                .insert(key, &rows, CacheWriteOptions::tagged(cache_tags(spec)));
        }

        #[cfg(feature = "metrics")]
        counter!("executor_queries_total", "source" => "remote").increment(1);
        Ok(rows)
    }

    /// Runs several read queries concurrently. Results come back in input
    /// order; each element succeeds or fails independently. Concurrency is
    /// naturally bounded by the pool.
    pub async fn batch(&self, specs: &[QuerySpec]) -> Vec<Result<ResultSet, DataError>> {
        join_all(specs.iter().map(|spec| self.query(spec))).await
    }

    /// Inserts rows, invalidating cached reads of the table.
    pub async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<u64, DataError> {
        self.execute_write(
            Statement::Insert {
                table: table.to_string(),
                rows,
            },
            Vec::new(),
        )
        .await
    }

    /// Updates rows matching `filters`, invalidating cached reads of the
    /// table and of any entities the filters pin down.
    pub async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        values: Value,
    ) -> Result<u64, DataError> {
        self.execute_write(
            Statement::Update {
                table: table.to_string(),
                filters,
                values,
            },
            Vec::new(),
        )
        .await
    }

    /// Deletes rows matching `filters`, with the same invalidation as
    /// [`update`](Self::update).
    pub async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64, DataError> {
        self.execute_write(
            Statement::Delete {
                table: table.to_string(),
                filters,
            },
            Vec::new(),
        )
        .await
    }

    /// Upserts a batch of rows, invalidating cached reads of the table.
    pub async fn upsert_batch(&self, table: &str, rows: Vec<Value>) -> Result<u64, DataError> {
        self.execute_write(
            Statement::UpsertBatch {
                table: table.to_string(),
                rows,
            },
            Vec::new(),
        )
        .await
    }

    /// Runs a write statement through the resilient path, then invalidates
    /// the table tag, any entity tags derivable from the statement's filters,
    /// and `extra_tags`. Returns the affected-row count.
    pub async fn execute_write(
        &self,
        statement: Statement,
        extra_tags: Vec<String>,
    ) -> Result<u64, DataError> {
        if !statement.is_write() {
            return Err(DataError::validation(
                "execute_write requires a write statement; use query for reads",
            ));
        }

        let affected = self
            .call_remote(&statement, &CancellationToken::new())
            .await?
            .affected()?;

        let mut tags: HashSet<String> = HashSet::new();
        tags.insert(statement.table().to_string());
        match &statement {
            Statement::Update { table, filters, .. } | Statement::Delete { table, filters } => {
                tags.extend(entity_tags(table, filters));
            }
            _ => {}
        }
        tags.extend(extra_tags);

        let mut removed = 0;
        for tag in &tags {
            removed += self.inner.cache.invalidate_by_tag(tag);
        }

        #[cfg(feature = "metrics")]
        counter!("executor_writes_total", "table" => statement.table().to_string()).increment(1);

        #[cfg(feature = "tracing")]
        debug!(
            table = %statement.table(),
            affected,
            invalidated = removed,
            "write committed"
        );
        let _ = removed;
        Ok(affected)
    }

    /// Drops cached reads for a table, or for one entity within it. The
    /// table tag goes too when an entity is named, because list queries are
    /// tagged only with the table. Returns the number of entries removed.
    pub fn invalidate(&self, table: &str, entity_id: Option<&str>) -> usize {
        let cache = &self.inner.cache;
        match entity_id {
            Some(id) => {
                cache.invalidate_by_tag(&format!("{table}:{id}")) + cache.invalidate_by_tag(table)
            }
            None => cache.invalidate_by_tag(table),
        }
    }

    /// A read-only snapshot across cache, pool, breakers, and retries.
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            cache: self.inner.cache.stats(),
            pool: self.inner.pool.stats(),
            breakers: self.inner.breakers.stats(),
            retries: self.inner.retry.counts_by_kind(),
        }
    }

    /// Retry → breaker → pool → remote, all bounded by `overall_timeout`.
    async fn call_remote(
        &self,
        statement: &Statement,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, DataError> {
        let started = Instant::now();
        let attempts = self
            .inner
            .retry
            .execute_with_cancel(token, |_attempt| self.attempt(statement));

        match timeout(self.inner.overall_timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(DataError::Timeout {
                elapsed: started.elapsed(),
            }),
        }
    }

    /// One attempt: ask the breaker, lease a connection, execute under the
    /// per-call deadline, and report the outcome to both.
    async fn attempt(&self, statement: &Statement) -> Result<ExecutionResult, DataError> {
        let inner = &self.inner;
        let breaker = inner.breakers.breaker(self.breaker_target());
        let guard = breaker.try_acquire()?;

        // A pool-side failure drops the guard unsettled: it says nothing
        // about the remote target's health.
        let mut conn = inner.pool.acquire(inner.preferred_region.as_deref()).await?;

        match timeout(inner.call_timeout, conn.execute(statement)).await {
            Ok(Ok(result)) => {
                guard.success();
                conn.release(true);
                Ok(result)
            }
            Ok(Err(error)) => {
                match &error {
                    // The target answered; rejecting the request does not
                    // make it unhealthy. The connection is fine too.
                    DataError::Validation { .. } | DataError::Authorization { .. } => {
                        guard.success();
                        conn.release(true);
                    }
                    // Load shedding: the target is alive, so the breaker
                    // stays out of it, and the connection is reusable.
                    DataError::RateLimited { .. } => {
                        conn.release(true);
                    }
                    _ => {
                        guard.failure();
                        conn.release(false);
                    }
                }
                Err(error)
            }
            Err(_) => {
                // The connection may still have a response in flight; never
                // reuse it without a health check.
                guard.failure();
                conn.release(false);
                Err(DataError::Timeout {
                    elapsed: inner.call_timeout,
                })
            }
        }
    }

    fn breaker_target(&self) -> &str {
        self.inner.preferred_region.as_deref().unwrap_or("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_circuitbreaker::CircuitState;
    use strata_pool::{Connection, Connector, PoolConfig};
    use strata_retry::{FixedDelay, RetryConfig};

    struct ScriptedConnection {
        script: Arc<Mutex<VecDeque<Result<ExecutionResult, DataError>>>>,
        executes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn execute(&mut self, _statement: &Statement) -> Result<ExecutionResult, DataError> {
            self.executes.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ExecutionResult::Rows(ResultSet::new(vec![json!({"id": 1})]))))
        }

        async fn ping(&mut self) -> Result<(), DataError> {
            Ok(())
        }
    }

    struct ScriptedConnector {
        script: Arc<Mutex<VecDeque<Result<ExecutionResult, DataError>>>>,
        executes: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new() -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                executes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn push(&self, result: Result<ExecutionResult, DataError>) {
            self.script.lock().unwrap().push_back(result);
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            _preferred_region: Option<&str>,
        ) -> Result<Box<dyn Connection>, DataError> {
            Ok(Box::new(ScriptedConnection {
                script: Arc::clone(&self.script),
                executes: Arc::clone(&self.executes),
            }))
        }
    }

    fn executor(connector: Arc<ScriptedConnector>) -> QueryExecutor {
        ExecutorBuilder::new(connector)
            .pool(
                PoolConfig::builder()
                    .acquire_timeout(Duration::from_millis(100))
                    .build(),
            )
            .retry(
                RetryConfig::builder()
                    .max_retries(2)
                    .backoff(FixedDelay(Duration::from_millis(1)))
                    .build(),
            )
            .call_timeout(Duration::from_millis(500))
            .overall_timeout(Duration::from_secs(5))
            .build()
    }

    #[tokio::test]
    async fn repeat_queries_are_served_from_cache() {
        let connector = Arc::new(ScriptedConnector::new());
        let executor = executor(Arc::clone(&connector));
        let spec = QuerySpec::table("users").filter(Filter::eq("status", "active"));

        let first = executor.query(&spec).await.unwrap();
        let second = executor.query(&spec).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(connector.executes.load(Ordering::SeqCst), 1);
        assert_eq!(executor.stats().cache.hits, 1);
    }

    #[tokio::test]
    async fn uncached_specs_always_reach_the_remote() {
        let connector = Arc::new(ScriptedConnector::new());
        let executor = executor(Arc::clone(&connector));
        let spec = QuerySpec::table("users").uncached();

        executor.query(&spec).await.unwrap();
        executor.query(&spec).await.unwrap();
        assert_eq!(connector.executes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_write_invalidates_cached_reads_of_the_table() {
        let connector = Arc::new(ScriptedConnector::new());
        let executor = executor(Arc::clone(&connector));
        let spec = QuerySpec::table("users").filter(Filter::eq("id", "u1"));

        executor.query(&spec).await.unwrap();
        connector.push(Ok(ExecutionResult::Affected(1)));
        let affected = executor
            .update(
                "users",
                vec![Filter::eq("id", "u1")],
                json!({"status": "banned"}),
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        // The cached entry is gone; the next read goes remote.
        executor.query(&spec).await.unwrap();
        assert_eq!(connector.executes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_errors_bypass_retry_and_the_breaker() {
        let connector = Arc::new(ScriptedConnector::new());
        let executor = executor(Arc::clone(&connector));
        for _ in 0..6 {
            connector.push(Err(DataError::validation("bad filter")));
            let err = executor
                .query(&QuerySpec::table("users").uncached())
                .await
                .unwrap_err();
            assert!(matches!(err, DataError::Validation { .. }));
        }
        // Six rejections, one attempt each, breaker untouched.
        assert_eq!(connector.executes.load(Ordering::SeqCst), 6);
        assert_eq!(
            executor.stats().breakers["default"].state,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn transient_failures_are_retried_transparently() {
        let connector = Arc::new(ScriptedConnector::new());
        let executor = executor(Arc::clone(&connector));
        connector.push(Err(DataError::transport("reset")));
        connector.push(Err(DataError::transport("reset")));

        let rows = executor
            .query(&QuerySpec::table("users"))
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(connector.executes.load(Ordering::SeqCst), 3);
        assert_eq!(executor.stats().retries["transport"], 2);
    }

    #[tokio::test]
    async fn invalidate_by_entity_also_drops_list_queries() {
        let connector = Arc::new(ScriptedConnector::new());
        let executor = executor(Arc::clone(&connector));
        let by_id = QuerySpec::table("orders").filter(Filter::eq("id", "o9"));
        let listing = QuerySpec::table("orders").page(10, 0);

        executor.query(&by_id).await.unwrap();
        executor.query(&listing).await.unwrap();
        assert_eq!(executor.invalidate("orders", Some("o9")), 2);
        assert_eq!(executor.stats().cache.entries, 0);
    }

    #[tokio::test]
    async fn lifecycle_round_trip() {
        let connector = Arc::new(ScriptedConnector::new());
        let executor = executor(connector);
        executor.init().await.unwrap();
        assert!(executor.stats().pool.total >= 1);
        executor.shutdown().await;
        assert_eq!(executor.stats().pool.total, 0);
    }

    #[test]
    #[should_panic(expected = "acquire_timeout")]
    fn acquire_timeout_must_nest_inside_call_timeout() {
        let connector = Arc::new(ScriptedConnector::new());
        let _ = ExecutorBuilder::new(connector)
            .pool(
                PoolConfig::builder()
                    .acquire_timeout(Duration::from_secs(3))
                    .build(),
            )
            .call_timeout(Duration::from_secs(2))
            .build();
    }

    #[test]
    #[should_panic(expected = "call_timeout")]
    fn call_timeout_must_nest_inside_overall_timeout() {
        let connector = Arc::new(ScriptedConnector::new());
        let _ = ExecutorBuilder::new(connector)
            .call_timeout(Duration::from_secs(10))
            .overall_timeout(Duration::from_secs(10))
            .build();
    }
}
