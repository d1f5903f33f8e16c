//! Pool observability events.

use std::time::{Duration, Instant};
use strata_core::ComponentEvent;

/// Events emitted by a [`Pool`](crate::Pool).
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A connection was created.
    ConnectionCreated {
        /// Configured pool name.
        name: String,
        /// Id of the new connection.
        connection_id: String,
        /// Region the connection landed in.
        region: String,
        /// When it was created.
        timestamp: Instant,
    },
    /// A connection was closed and removed from the pool.
    ConnectionClosed {
        /// Configured pool name.
        name: String,
        /// Id of the closed connection.
        connection_id: String,
        /// When it was closed.
        timestamp: Instant,
    },
    /// A lease was handed to a caller.
    Acquired {
        /// Configured pool name.
        name: String,
        /// Id of the leased connection.
        connection_id: String,
        /// How long the caller waited.
        waited: Duration,
        /// When the lease started.
        timestamp: Instant,
    },
    /// A lease ended and the connection returned to the idle set.
    Released {
        /// Configured pool name.
        name: String,
        /// Id of the released connection.
        connection_id: String,
        /// Whether the caller reported the connection healthy.
        healthy: bool,
        /// When the lease ended.
        timestamp: Instant,
    },
    /// No connection became available within the acquire timeout.
    AcquireTimedOut {
        /// Configured pool name.
        name: String,
        /// How long the caller waited.
        waited: Duration,
        /// When the timeout fired.
        timestamp: Instant,
    },
    /// An idle connection failed a health probe.
    HealthCheckFailed {
        /// Configured pool name.
        name: String,
        /// Id of the failing connection.
        connection_id: String,
        /// Consecutive failures so far.
        consecutive_failures: u32,
        /// When the probe failed.
        timestamp: Instant,
    },
}

impl ComponentEvent for PoolEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PoolEvent::ConnectionCreated { .. } => "connection_created",
            PoolEvent::ConnectionClosed { .. } => "connection_closed",
            PoolEvent::Acquired { .. } => "acquired",
            PoolEvent::Released { .. } => "released",
            PoolEvent::AcquireTimedOut { .. } => "acquire_timed_out",
            PoolEvent::HealthCheckFailed { .. } => "health_check_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            PoolEvent::ConnectionCreated { timestamp, .. }
            | PoolEvent::ConnectionClosed { timestamp, .. }
            | PoolEvent::Acquired { timestamp, .. }
            | PoolEvent::Released { timestamp, .. }
            | PoolEvent::AcquireTimedOut { timestamp, .. }
            | PoolEvent::HealthCheckFailed { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            PoolEvent::ConnectionCreated { name, .. }
            | PoolEvent::ConnectionClosed { name, .. }
            | PoolEvent::Acquired { name, .. }
            | PoolEvent::Released { name, .. }
            | PoolEvent::AcquireTimedOut { name, .. }
            | PoolEvent::HealthCheckFailed { name, .. } => name,
        }
    }
}
