//! The upstream seam: how the pool creates and talks to connections.

use async_trait::async_trait;
use std::time::Instant;
use strata_core::{DataError, ExecutionResult, Statement};

/// A live session with the remote data service.
///
/// Connections are owned exclusively by the pool and leased to one caller at
/// a time; implementations never need internal synchronization.
#[async_trait]
pub trait Connection: Send {
    /// Executes a statement against the remote service.
    async fn execute(&mut self, statement: &Statement) -> Result<ExecutionResult, DataError>;

    /// Cheap liveness probe, used by the health checker and when re-checking
    /// a connection released as unhealthy.
    async fn ping(&mut self) -> Result<(), DataError>;

    /// Closes the session. Called once when the pool discards the connection;
    /// the default is a no-op for transports that close on drop.
    async fn close(&mut self) {}
}

/// Creates connections, optionally colocated with a preferred region.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new connection.
    ///
    /// `preferred_region` is a soft hint; a connector without presence in
    /// that region should connect wherever it can rather than fail.
    async fn connect(
        &self,
        preferred_region: Option<&str>,
    ) -> Result<Box<dyn Connection>, DataError>;

    /// The region a connection from this connector would land in for the
    /// given hint, used to label pooled connections.
    fn region(&self, preferred_region: Option<&str>) -> String {
        preferred_region.unwrap_or("default").to_string()
    }
}

/// Pool-side bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    /// Unique id within this pool, e.g. `primary-3`.
    pub id: String,
    /// Region the connection is colocated with.
    pub region: String,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last leased or released.
    pub last_used_at: Instant,
    /// Whether the last health signal for this connection was good.
    pub healthy: bool,
    /// Number of times the connection has been leased.
    pub use_count: u64,
    /// Consecutive failed health probes.
    pub(crate) failed_pings: u32,
    /// Set when a caller released the connection as unhealthy; forces a ping
    /// before the next lease.
    pub(crate) needs_check: bool,
}

impl ConnectionMeta {
    pub(crate) fn new(id: String, region: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            region,
            created_at: now,
            last_used_at: now,
            healthy: true,
            use_count: 0,
            failed_pings: 0,
            needs_check: false,
        }
    }
}
