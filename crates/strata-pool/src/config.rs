//! Pool configuration.

use crate::events::PoolEvent;
use std::time::Duration;
use strata_core::{EventListeners, FnListener};

/// Configuration for a [`Pool`](crate::Pool).
#[derive(Clone)]
pub struct PoolConfig {
    pub(crate) min_connections: usize,
    pub(crate) max_connections: usize,
    pub(crate) acquire_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) health_check_interval: Duration,
    pub(crate) drain_timeout: Duration,
    pub(crate) event_listeners: EventListeners<PoolEvent>,
    pub(crate) name: String,
}

impl PoolConfig {
    /// Creates a configuration builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// The configured acquire timeout.
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// The configured maximum pool size.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`PoolConfig`].
pub struct PoolConfigBuilder {
    min_connections: usize,
    max_connections: usize,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    health_check_interval: Duration,
    drain_timeout: Duration,
    event_listeners: EventListeners<PoolEvent>,
    name: String,
}

impl PoolConfigBuilder {
    /// Creates a builder with defaults.
    pub fn new() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_millis(750),
            idle_timeout: Duration::from_secs(90),
            health_check_interval: Duration::from_secs(15),
            drain_timeout: Duration::from_secs(10),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Connections kept warm at all times.
    ///
    /// Default: 1
    pub fn min_connections(mut self, n: usize) -> Self {
        self.min_connections = n;
        self
    }

    /// Upper bound on live connections and concurrent leases.
    ///
    /// Default: 10
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n.max(1);
        self
    }

    /// How long an `acquire` call may wait before failing with
    /// `PoolExhausted`.
    ///
    /// Default: 750ms
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Idle connections beyond this age shrink back toward
    /// `min_connections`.
    ///
    /// Default: 90 seconds
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Interval between health-check passes over the idle set.
    ///
    /// Default: 15 seconds
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// How long `drain` waits for in-flight leases before closing anyway.
    ///
    /// Default: 10 seconds
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Give this pool a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback for acquire timeouts.
    pub fn on_acquire_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &PoolEvent| {
                if let PoolEvent::AcquireTimedOut { waited, .. } = event {
                    f(*waited);
                }
            }));
        self
    }

    /// Registers a callback for failed health probes, receiving the
    /// connection id and its consecutive-failure count.
    pub fn on_health_check_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &PoolEvent| {
                if let PoolEvent::HealthCheckFailed {
                    connection_id,
                    consecutive_failures,
                    ..
                } = event
                {
                    f(connection_id, *consecutive_failures);
                }
            }));
        self
    }

    /// Registers a callback for connection closures.
    pub fn on_connection_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &PoolEvent| {
                if let PoolEvent::ConnectionClosed { connection_id, .. } = event {
                    f(connection_id);
                }
            }));
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `min_connections` exceeds `max_connections`.
    pub fn build(self) -> PoolConfig {
        if self.min_connections > self.max_connections {
            panic!("min_connections must not exceed max_connections");
        }
        PoolConfig {
            min_connections: self.min_connections,
            max_connections: self.max_connections,
            acquire_timeout: self.acquire_timeout,
            idle_timeout: self.idle_timeout,
            health_check_interval: self.health_check_interval,
            drain_timeout: self.drain_timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
