//! Bounded connection pool for the strata data-access layer.
//!
//! The pool owns every connection to the remote data service and leases each
//! one to at most one in-flight call at a time. Capacity is bounded by a
//! semaphore sized to `max_connections`; an acquire that cannot be satisfied
//! within `acquire_timeout` fails with [`DataError::PoolExhausted`].
//!
//! Leases are drop guards: a [`PooledConnection`] returns to the idle set when
//! dropped, whether the call succeeded, failed, or was cancelled, so a lease
//! can never leak. Region affinity is a soft preference during idle selection,
//! never a hard requirement.
//!
//! A background health checker pings idle connections on an interval; two
//! consecutive failures remove a connection, and the pool replenishes toward
//! `min_connections`. Idle connections beyond `idle_timeout` shrink back
//! toward the minimum.
//!
//! # Examples
//!
//! ```no_run
//! use strata_pool::{Pool, PoolConfig};
//! # use strata_pool::{Connection, Connector};
//! # use strata_core::DataError;
//! # async fn example(connector: std::sync::Arc<dyn Connector>) -> Result<(), DataError> {
//! let pool = Pool::new(
//!     connector,
//!     PoolConfig::builder()
//!         .min_connections(2)
//!         .max_connections(10)
//!         .name("primary")
//!         .build(),
//! );
//! pool.warm_up().await?;
//! pool.spawn_health_checker();
//!
//! let mut conn = pool.acquire(Some("us-east-1")).await?;
//! // ... conn.execute(&statement).await? ...
//! conn.release(true);
//! # Ok(())
//! # }
//! ```

mod config;
mod connect;
mod events;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use connect::{Connection, ConnectionMeta, Connector};
pub use events::PoolEvent;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strata_core::DataError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// Point-in-time pool occupancy and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Live connections (idle + leased).
    pub total: usize,
    /// Connections currently in the idle set.
    pub idle: usize,
    /// Connections currently leased to callers.
    pub active: usize,
    /// Connections created over the pool's lifetime.
    pub created: u64,
    /// Connections closed over the pool's lifetime.
    pub closed: u64,
}

struct IdleConn {
    conn: Box<dyn Connection>,
    meta: ConnectionMeta,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConn>>,
    total: AtomicUsize,
    created: AtomicU64,
    closed: AtomicU64,
    seq: AtomicU64,
    draining: AtomicBool,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

/// The connection pool. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates a pool over the given connector. No connections are opened
    /// until [`warm_up`](Self::warm_up) or the first acquire.
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_connections));
        Self {
            inner: Arc::new(PoolInner {
                connector,
                config,
                semaphore,
                idle: Mutex::new(Vec::new()),
                total: AtomicUsize::new(0),
                created: AtomicU64::new(0),
                closed: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                draining: AtomicBool::new(false),
                health_task: Mutex::new(None),
            }),
        }
    }

    /// Opens connections until `min_connections` are warm.
    pub async fn warm_up(&self) -> Result<(), DataError> {
        let inner = &self.inner;
        while inner.total.load(Ordering::Acquire) < inner.config.min_connections {
            let Some(slot) = inner.try_reserve_slot() else {
                break;
            };
            let ic = inner.connect_reserved(slot, None).await?;
            inner.idle.lock().unwrap().push(ic);
        }
        inner.publish_gauges();
        Ok(())
    }

    /// Leases a connection, preferring one colocated with `preferred_region`.
    ///
    /// Falls back to any idle healthy connection, then to creating a new one
    /// under `max_connections`. Blocks up to `acquire_timeout`, then fails
    /// with [`DataError::PoolExhausted`].
    pub async fn acquire(
        &self,
        preferred_region: Option<&str>,
    ) -> Result<PooledConnection, DataError> {
        let start = Instant::now();
        if self.inner.draining.load(Ordering::Acquire) {
            return Err(DataError::PoolExhausted {
                waited: Duration::ZERO,
            });
        }

        match timeout(
            self.inner.config.acquire_timeout,
            self.acquire_inner(preferred_region, start),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let waited = start.elapsed();
                self.inner
                    .config
                    .event_listeners
                    .emit(&PoolEvent::AcquireTimedOut {
                        name: self.inner.config.name.clone(),
                        waited,
                        timestamp: Instant::now(),
                    });

                #[cfg(feature = "metrics")]
                counter!("pool_acquire_timeouts_total", "pool" => self.inner.config.name.clone())
                    .increment(1);

                #[cfg(feature = "tracing")]
                debug!(pool = %self.inner.config.name, ?waited, "acquire timed out");

                Err(DataError::PoolExhausted { waited })
            }
        }
    }

    async fn acquire_inner(
        &self,
        preferred_region: Option<&str>,
        start: Instant,
    ) -> Result<PooledConnection, DataError> {
        let inner = &self.inner;
        let permit = inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DataError::PoolExhausted {
                waited: start.elapsed(),
            })?;

        loop {
            let candidate = {
                let mut idle = inner.idle.lock().unwrap();
                take_idle(&mut idle, preferred_region)
            };

            if let Some(ic) = candidate {
                if ic.meta.needs_check {
                    // Released as unhealthy; verify before handing it out.
                    let mut checkout = IdleCheckout::new(inner, ic);
                    if checkout.ping().await.is_err() {
                        inner.close_connection(checkout.take()).await;
                        continue;
                    }
                    let mut ic = checkout.take();
                    ic.meta.needs_check = false;
                    ic.meta.failed_pings = 0;
                    ic.meta.healthy = true;
                    return Ok(self.lease(ic, permit, start));
                }
                return Ok(self.lease(ic, permit, start));
            }

            if let Some(slot) = inner.try_reserve_slot() {
                let ic = inner.connect_reserved(slot, preferred_region).await?;
                return Ok(self.lease(ic, permit, start));
            }

            // Every slot is transiently accounted for (e.g. idle connections
            // pulled out for a health pass); re-scan shortly.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn lease(
        &self,
        mut ic: IdleConn,
        permit: OwnedSemaphorePermit,
        start: Instant,
    ) -> PooledConnection {
        ic.meta.use_count += 1;
        ic.meta.last_used_at = Instant::now();

        self.inner.config.event_listeners.emit(&PoolEvent::Acquired {
            name: self.inner.config.name.clone(),
            connection_id: ic.meta.id.clone(),
            waited: start.elapsed(),
            timestamp: Instant::now(),
        });
        self.inner.publish_gauges();

        PooledConnection {
            slot: Some(ic),
            _permit: Some(permit),
            inner: Arc::clone(&self.inner),
            healthy_hint: true,
        }
    }

    /// Starts the periodic health checker on the current tokio runtime.
    ///
    /// Idempotent in effect: calling again replaces the previous task.
    pub fn spawn_health_checker(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.health_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if inner.draining.load(Ordering::Acquire) {
                    break;
                }
                health_pass(&inner).await;
            }
        });
        if let Some(previous) = self.inner.health_task.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Stops accepting acquisitions, waits (bounded by `drain_timeout`) for
    /// in-flight leases, and closes every connection. Used at shutdown.
    pub async fn drain(&self) {
        let inner = &self.inner;
        if inner.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = inner.health_task.lock().unwrap().take() {
            handle.abort();
        }

        let max = inner.config.max_connections as u32;
        let waited = timeout(
            inner.config.drain_timeout,
            inner.semaphore.clone().acquire_many_owned(max),
        )
        .await;

        // Wake any pending acquirers with a closed semaphore.
        inner.semaphore.close();

        let idles: Vec<IdleConn> = inner.idle.lock().unwrap().drain(..).collect();
        for ic in idles {
            inner.close_connection(ic).await;
        }

        #[cfg(feature = "tracing")]
        if waited.is_err() {
            warn!(pool = %inner.config.name, "drain timeout elapsed with leases still in flight");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = waited;

        inner.publish_gauges();

        #[cfg(feature = "tracing")]
        info!(pool = %inner.config.name, "pool drained");
    }

    /// A snapshot of pool occupancy and lifetime counters.
    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().unwrap().len();
        let total = self.inner.total.load(Ordering::Acquire);
        PoolStats {
            total,
            idle,
            active: total.saturating_sub(idle),
            created: self.inner.created.load(Ordering::Relaxed),
            closed: self.inner.closed.load(Ordering::Relaxed),
        }
    }

    /// The pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

fn take_idle(idle: &mut Vec<IdleConn>, preferred_region: Option<&str>) -> Option<IdleConn> {
    if let Some(region) = preferred_region {
        if let Some(pos) = idle.iter().rposition(|c| c.meta.region == region) {
            return Some(idle.swap_remove(pos));
        }
    }
    idle.pop()
}

async fn health_pass(inner: &Arc<PoolInner>) {
    let batch: Vec<IdleConn> = inner.idle.lock().unwrap().drain(..).collect();
    let now = Instant::now();

    // Checked conns go straight back into the idle set so an aborted task
    // (health checker replaced, pool drained) holds at most one in flight.
    for ic in batch {
        let mut checkout = IdleCheckout::new(inner, ic);

        let past_idle_timeout =
            now.duration_since(checkout.meta().last_used_at) >= inner.config.idle_timeout;
        if past_idle_timeout && inner.total.load(Ordering::Acquire) > inner.config.min_connections {
            #[cfg(feature = "tracing")]
            debug!(pool = %inner.config.name, connection = %checkout.meta().id, "shrinking idle connection");
            inner.close_connection(checkout.take()).await;
            continue;
        }

        match checkout.ping().await {
            Ok(()) => {
                let mut ic = checkout.take();
                ic.meta.failed_pings = 0;
                ic.meta.healthy = true;
                ic.meta.needs_check = false;
                inner.idle.lock().unwrap().push(ic);
            }
            Err(_e) => {
                let mut ic = checkout.take();
                ic.meta.failed_pings += 1;
                ic.meta.healthy = false;

                inner
                    .config
                    .event_listeners
                    .emit(&PoolEvent::HealthCheckFailed {
                        name: inner.config.name.clone(),
                        connection_id: ic.meta.id.clone(),
                        consecutive_failures: ic.meta.failed_pings,
                        timestamp: Instant::now(),
                    });

                #[cfg(feature = "metrics")]
                counter!("pool_health_check_failures_total", "pool" => inner.config.name.clone())
                    .increment(1);

                #[cfg(feature = "tracing")]
                warn!(
                    pool = %inner.config.name,
                    connection = %ic.meta.id,
                    failures = ic.meta.failed_pings,
                    error = %_e,
                    "idle health check failed"
                );

                if ic.meta.failed_pings >= 2 {
                    inner.close_connection(ic).await;
                } else {
                    inner.idle.lock().unwrap().push(ic);
                }
            }
        }
    }

    // Replenish toward the warm minimum.
    while inner.total.load(Ordering::Acquire) < inner.config.min_connections
        && !inner.draining.load(Ordering::Acquire)
    {
        let Some(slot) = inner.try_reserve_slot() else {
            break;
        };
        match inner.connect_reserved(slot, None).await {
            Ok(ic) => inner.idle.lock().unwrap().push(ic),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                warn!(pool = %inner.config.name, error = %_e, "failed to replenish pool");
                break;
            }
        }
    }

    inner.publish_gauges();
}

/// A claim on one of the `max_connections` capacity slots.
///
/// Dropping the claim before [`commit`](Self::commit) releases the slot, so
/// the accounting survives an acquire future dropped mid-connect (acquire
/// timeout, caller cancellation).
#[must_use]
struct SlotReservation<'a> {
    pool: &'a PoolInner,
    committed: bool,
}

impl SlotReservation<'_> {
    /// Marks the slot as filled by a live connection.
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.release_slot();
        }
    }
}

/// A connection pulled out of the idle set for an awaited check.
///
/// While checked out the connection is counted in `total` but sits in no
/// collection; if the surrounding future is dropped mid-ping the guard
/// discards the connection rather than leaking its slot.
struct IdleCheckout<'a> {
    pool: &'a PoolInner,
    ic: Option<IdleConn>,
}

impl<'a> IdleCheckout<'a> {
    fn new(pool: &'a PoolInner, ic: IdleConn) -> Self {
        Self { pool, ic: Some(ic) }
    }

    fn meta(&self) -> &ConnectionMeta {
        &self.ic.as_ref().expect("checkout live until taken").meta
    }

    async fn ping(&mut self) -> Result<(), DataError> {
        self.ic
            .as_mut()
            .expect("checkout live until taken")
            .conn
            .ping()
            .await
    }

    fn take(mut self) -> IdleConn {
        self.ic.take().expect("checkout live until taken")
    }
}

impl Drop for IdleCheckout<'_> {
    fn drop(&mut self) {
        if let Some(ic) = self.ic.take() {
            self.pool.discard(ic);
        }
    }
}

impl PoolInner {
    /// Reserves one of the `max_connections` slots. The reservation releases
    /// itself on drop unless committed to a live connection.
    fn try_reserve_slot(&self) -> Option<SlotReservation<'_>> {
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                if t < self.config.max_connections {
                    Some(t + 1)
                } else {
                    None
                }
            })
            .is_ok()
            .then(|| SlotReservation {
                pool: self,
                committed: false,
            })
    }

    fn release_slot(&self) {
        self.total.fetch_sub(1, Ordering::AcqRel);
    }

    /// Opens a connection into a reserved slot. Connect errors and a caller
    /// dropped mid-connect both release the slot through the reservation.
    async fn connect_reserved(
        &self,
        slot: SlotReservation<'_>,
        preferred_region: Option<&str>,
    ) -> Result<IdleConn, DataError> {
        let conn = self.connector.connect(preferred_region).await?;
        slot.commit();

        let id = format!(
            "{}-{}",
            self.config.name,
            self.seq.fetch_add(1, Ordering::Relaxed)
        );
        let region = self.connector.region(preferred_region);
        self.created.fetch_add(1, Ordering::Relaxed);

        self.config.event_listeners.emit(&PoolEvent::ConnectionCreated {
            name: self.config.name.clone(),
            connection_id: id.clone(),
            region: region.clone(),
            timestamp: Instant::now(),
        });

        #[cfg(feature = "metrics")]
        counter!("pool_connections_created_total", "pool" => self.config.name.clone())
            .increment(1);

        Ok(IdleConn {
            conn,
            meta: ConnectionMeta::new(id, region),
        })
    }

    async fn close_connection(&self, mut ic: IdleConn) {
        // Account before the courtesy close so a caller dropped mid-close
        // cannot leak the slot; the transport also closes when the box drops.
        self.account_closed(&ic.meta);
        ic.conn.close().await;
    }

    /// Closure without the async `close` courtesy call; used from `Drop`,
    /// where the transport closes when the box drops.
    fn discard(&self, ic: IdleConn) {
        self.account_closed(&ic.meta);
    }

    fn account_closed(&self, meta: &ConnectionMeta) {
        self.release_slot();
        self.closed.fetch_add(1, Ordering::Relaxed);

        self.config.event_listeners.emit(&PoolEvent::ConnectionClosed {
            name: self.config.name.clone(),
            connection_id: meta.id.clone(),
            timestamp: Instant::now(),
        });

        #[cfg(feature = "metrics")]
        counter!("pool_connections_closed_total", "pool" => self.config.name.clone()).increment(1);
    }

    fn publish_gauges(&self) {
        #[cfg(feature = "metrics")]
        {
            let idle = self.idle.lock().unwrap().len();
            let total = self.total.load(Ordering::Acquire);
            gauge!("pool_connections", "pool" => self.config.name.clone(), "state" => "idle")
                .set(idle as f64);
            gauge!("pool_connections", "pool" => self.config.name.clone(), "state" => "active")
                .set(total.saturating_sub(idle) as f64);
            gauge!("pool_connections", "pool" => self.config.name.clone(), "state" => "total")
                .set(total as f64);
        }
    }
}

/// An exclusive lease on one pooled connection.
///
/// Dereferences to [`Connection`]. Dropping the guard returns the connection
/// to the pool; [`release`](Self::release) does the same while reporting
/// connection health.
pub struct PooledConnection {
    slot: Option<IdleConn>,
    _permit: Option<OwnedSemaphorePermit>,
    inner: Arc<PoolInner>,
    healthy_hint: bool,
}

impl PooledConnection {
    /// Pool-side metadata for the leased connection.
    pub fn meta(&self) -> &ConnectionMeta {
        &self.slot.as_ref().expect("lease valid until drop").meta
    }

    /// Returns the connection to the pool, reporting whether it is healthy.
    ///
    /// A connection released as unhealthy is re-pinged before its next lease.
    pub fn release(mut self, healthy: bool) {
        self.healthy_hint = healthy;
        // Drop does the rest.
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PooledConnection");
        if let Some(ic) = &self.slot {
            s.field("id", &ic.meta.id).field("region", &ic.meta.region);
        }
        s.field("healthy_hint", &self.healthy_hint).finish()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.slot
            .as_ref()
            .expect("lease valid until drop")
            .conn
            .as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slot
            .as_mut()
            .expect("lease valid until drop")
            .conn
            .as_mut()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(mut ic) = self.slot.take() {
            ic.meta.last_used_at = Instant::now();
            ic.meta.needs_check = !self.healthy_hint;
            if !self.healthy_hint {
                ic.meta.healthy = false;
            }

            if self.inner.draining.load(Ordering::Acquire) {
                self.inner.discard(ic);
            } else {
                self.inner.config.event_listeners.emit(&PoolEvent::Released {
                    name: self.inner.config.name.clone(),
                    connection_id: ic.meta.id.clone(),
                    healthy: self.healthy_hint,
                    timestamp: Instant::now(),
                });
                self.inner.idle.lock().unwrap().push(ic);
            }
            self.inner.publish_gauges();
        }
        // The permit drops after the connection is back, releasing capacity.
    }
}
