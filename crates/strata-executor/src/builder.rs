//! Executor construction and dependency injection.

use crate::{ExecutorInner, QueryExecutor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_cache::{CacheConfig, CacheStore};
use strata_circuitbreaker::{BreakerConfig, BreakerRegistry};
use strata_pool::{Connector, Pool, PoolConfig};
use strata_retry::{RetryConfig, RetryPolicy};

/// Builder for [`QueryExecutor`].
///
/// Every dependency is injected here; the executor holds no global state, so
/// tests and multi-backend deployments construct as many isolated instances
/// as they need.
pub struct ExecutorBuilder {
    connector: Arc<dyn Connector>,
    cache_config: CacheConfig,
    pool_config: PoolConfig,
    breaker_config: BreakerConfig,
    retry_config: RetryConfig,
    preferred_region: Option<String>,
    call_timeout: Duration,
    overall_timeout: Duration,
}

impl ExecutorBuilder {
    /// Starts a builder around the connector that reaches the remote data
    /// service.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            cache_config: CacheConfig::default(),
            pool_config: PoolConfig::default(),
            breaker_config: BreakerConfig::default(),
            retry_config: RetryConfig::default(),
            preferred_region: None,
            call_timeout: Duration::from_secs(2),
            overall_timeout: Duration::from_secs(10),
        }
    }

    /// Cache store configuration.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Connection pool configuration.
    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Template configuration for per-target circuit breakers.
    pub fn circuit_breaker(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Retry policy configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Region to prefer when acquiring connections. Also names the circuit
    /// breaker target for this executor's calls.
    pub fn preferred_region<R: Into<String>>(mut self, region: R) -> Self {
        self.preferred_region = Some(region.into());
        self
    }

    /// Deadline for a single remote call (pool acquire + execute).
    ///
    /// Default: 2 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Deadline for a whole operation, including every retry and backoff.
    ///
    /// Default: 10 seconds
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    /// Builds the executor. Background tasks start with
    /// [`QueryExecutor::init`], not here.
    ///
    /// # Panics
    ///
    /// Panics unless the timeouts nest:
    /// `pool acquire_timeout < call_timeout < overall_timeout`. A call
    /// deadline shorter than the acquire wait would classify every slow
    /// acquire as a remote timeout and feed the breaker noise.
    pub fn build(self) -> QueryExecutor {
        if self.pool_config.acquire_timeout() >= self.call_timeout {
            panic!("pool acquire_timeout must be shorter than call_timeout");
        }
        if self.call_timeout >= self.overall_timeout {
            panic!("call_timeout must be shorter than overall_timeout");
        }

        QueryExecutor {
            inner: Arc::new(ExecutorInner {
                cache: Arc::new(CacheStore::new(self.cache_config)),
                pool: Pool::new(self.connector, self.pool_config),
                breakers: BreakerRegistry::new(self.breaker_config),
                retry: RetryPolicy::new(self.retry_config),
                preferred_region: self.preferred_region,
                call_timeout: self.call_timeout,
                overall_timeout: self.overall_timeout,
                sweeper: Mutex::new(None),
            }),
        }
    }
}
