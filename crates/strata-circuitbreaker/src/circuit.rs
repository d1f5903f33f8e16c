//! The circuit breaker state machine.

use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use strata_core::DataError;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// The three breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through; consecutive failures are counted.
    Closed,
    /// Calls fail fast until the reset timeout elapses.
    Open,
    /// A bounded number of probe calls test whether the target recovered.
    HalfOpen,
}

impl CircuitState {
    /// Short lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time breaker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures recorded while closed.
    pub consecutive_failures: u32,
    /// Calls rejected without reaching the target.
    pub rejected: u64,
    /// Times the breaker has tripped open.
    pub times_opened: u64,
}

struct Shared {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    probe_successes: u32,
}

struct BreakerInner {
    config: BreakerConfig,
    shared: Mutex<Shared>,
    // Mirror of `shared.state` for lock-free reads.
    state_tag: AtomicU8,
    rejected: AtomicU64,
    times_opened: AtomicU64,
}

/// A per-target circuit breaker.
///
/// Trips open after `failure_threshold` consecutive failures, fails fast with
/// [`DataError::CircuitOpen`] while open, and recovers through a bounded
/// half-open probe phase. Cheap to clone; clones share state.
///
/// Callers take a [`CallGuard`] before the protected call and settle it with
/// the outcome. A guard dropped unsettled counts as neither success nor
/// failure, so cancellations and local errors (pool exhaustion, validation)
/// never move the state machine.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a breaker in the closed state.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(BreakerInner {
                config,
                shared: Mutex::new(Shared {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                    probes_in_flight: 0,
                    probe_successes: 0,
                }),
                state_tag: AtomicU8::new(CircuitState::Closed.as_u8()),
                rejected: AtomicU64::new(0),
                times_opened: AtomicU64::new(0),
            }),
        }
    }

    /// Asks permission for one call to the protected target.
    ///
    /// While open, checks whether the reset timeout has elapsed and moves to
    /// half-open if so; otherwise rejects with [`DataError::CircuitOpen`].
    /// While half-open, admits calls as probes up to the probe budget and
    /// rejects the rest.
    pub fn try_acquire(&self) -> Result<CallGuard, DataError> {
        let inner = &self.inner;
        let mut shared = inner.shared.lock().unwrap();

        if shared.state == CircuitState::Open {
            let elapsed_reset = shared
                .opened_at
                .is_some_and(|at| at.elapsed() >= inner.config.reset_timeout);
            if elapsed_reset {
                inner.transition_to(&mut shared, CircuitState::HalfOpen);
            } else {
                return Err(self.reject(&shared));
            }
        }

        match shared.state {
            CircuitState::Closed => Ok(CallGuard {
                breaker: self.clone(),
                probe: false,
                settled: false,
            }),
            CircuitState::HalfOpen => {
                if shared.probes_in_flight < inner.config.probe_budget {
                    shared.probes_in_flight += 1;
                    inner.config.event_listeners.emit(&BreakerEvent::ProbeAdmitted {
                        name: inner.config.name.clone(),
                        timestamp: Instant::now(),
                    });

                    #[cfg(feature = "tracing")]
                    debug!(breaker = %inner.config.name, "probe admitted");

                    Ok(CallGuard {
                        breaker: self.clone(),
                        probe: true,
                        settled: false,
                    })
                } else {
                    Err(self.reject(&shared))
                }
            }
            // Open is handled above.
            CircuitState::Open => Err(self.reject(&shared)),
        }
    }

    fn reject(&self, shared: &Shared) -> DataError {
        let inner = &self.inner;
        inner.rejected.fetch_add(1, Ordering::Relaxed);
        inner.config.event_listeners.emit(&BreakerEvent::CallRejected {
            name: inner.config.name.clone(),
            state: shared.state,
            timestamp: Instant::now(),
        });

        #[cfg(feature = "metrics")]
        counter!("circuit_breaker_rejections_total", "breaker" => inner.config.name.clone())
            .increment(1);

        DataError::CircuitOpen {
            target: inner.config.name.clone(),
        }
    }

    fn on_success(&self, probe: bool) {
        let inner = &self.inner;
        let mut shared = inner.shared.lock().unwrap();
        match shared.state {
            CircuitState::Closed => {
                shared.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if probe => {
                shared.probes_in_flight = shared.probes_in_flight.saturating_sub(1);
                shared.probe_successes += 1;
                if shared.probe_successes >= inner.config.required_probe_successes {
                    inner.transition_to(&mut shared, CircuitState::Closed);
                }
            }
            // A straggler from before the last transition; its outcome no
            // longer describes the current window.
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let inner = &self.inner;
        let mut shared = inner.shared.lock().unwrap();
        match shared.state {
            CircuitState::Closed => {
                shared.consecutive_failures += 1;
                if shared.consecutive_failures >= inner.config.failure_threshold {
                    inner.transition_to(&mut shared, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if probe => {
                // The target is still unhealthy; back to open with a fresh
                // reset timer.
                inner.transition_to(&mut shared, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn on_abandoned(&self, probe: bool) {
        if !probe {
            return;
        }
        let mut shared = self.inner.shared.lock().unwrap();
        if shared.state == CircuitState::HalfOpen {
            shared.probes_in_flight = shared.probes_in_flight.saturating_sub(1);
        }
    }

    /// Current state, without taking the lock.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.inner.state_tag.load(Ordering::Acquire))
    }

    /// A snapshot of breaker counters.
    pub fn stats(&self) -> BreakerStats {
        let shared = self.inner.shared.lock().unwrap();
        BreakerStats {
            state: shared.state,
            consecutive_failures: shared.consecutive_failures,
            rejected: self.inner.rejected.load(Ordering::Relaxed),
            times_opened: self.inner.times_opened.load(Ordering::Relaxed),
        }
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Trips the breaker open, regardless of the failure count. Maintenance
    /// hook for taking a target out of rotation.
    pub fn force_open(&self) {
        let mut shared = self.inner.shared.lock().unwrap();
        self.inner.transition_to(&mut shared, CircuitState::Open);
    }

    /// Closes the breaker, regardless of its state. Maintenance hook.
    pub fn force_closed(&self) {
        let mut shared = self.inner.shared.lock().unwrap();
        self.inner.transition_to(&mut shared, CircuitState::Closed);
    }

    /// Returns the breaker to a pristine closed state, clearing any failure
    /// streak.
    pub fn reset(&self) {
        let mut shared = self.inner.shared.lock().unwrap();
        if shared.state == CircuitState::Closed {
            shared.consecutive_failures = 0;
        } else {
            self.inner.transition_to(&mut shared, CircuitState::Closed);
        }
    }
}

impl BreakerInner {
    /// The single place state changes. Resets the per-state counters, keeps
    /// the atomic mirror in sync, and notifies listeners.
    fn transition_to(&self, shared: &mut MutexGuard<'_, Shared>, new_state: CircuitState) {
        let from = shared.state;
        if from == new_state {
            return;
        }
        shared.state = new_state;
        self.state_tag.store(new_state.as_u8(), Ordering::Release);

        match new_state {
            CircuitState::Closed => {
                shared.consecutive_failures = 0;
                shared.opened_at = None;
                shared.probes_in_flight = 0;
                shared.probe_successes = 0;
            }
            CircuitState::Open => {
                shared.opened_at = Some(Instant::now());
                shared.probes_in_flight = 0;
                shared.probe_successes = 0;
                self.times_opened.fetch_add(1, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                shared.probes_in_flight = 0;
                shared.probe_successes = 0;
            }
        }

        self.config.event_listeners.emit(&BreakerEvent::StateChanged {
            name: self.config.name.clone(),
            from,
            to: new_state,
            timestamp: Instant::now(),
        });

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuit_breaker_transitions_total",
                "breaker" => self.config.name.clone(),
                "to" => new_state.as_str()
            )
            .increment(1);
            gauge!("circuit_breaker_state", "breaker" => self.config.name.clone())
                .set(new_state.as_u8() as f64);
        }

        #[cfg(feature = "tracing")]
        match new_state {
            CircuitState::Open => {
                warn!(breaker = %self.config.name, %from, "circuit opened")
            }
            _ => info!(breaker = %self.config.name, %from, to = %new_state, "circuit transition"),
        }
    }
}

/// Permission for one call through the breaker.
///
/// Settle with [`success`](Self::success) or [`failure`](Self::failure);
/// dropping the guard unsettled releases any probe slot without recording an
/// outcome.
#[must_use = "settle the guard with success() or failure(), or drop it to abandon the call"]
pub struct CallGuard {
    breaker: CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CallGuard {
    /// Records a successful call.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    /// Records a failed call.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }

    /// Whether this call was admitted as a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

impl fmt::Debug for CallGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallGuard")
            .field("breaker", &self.breaker.name())
            .field("probe", &self.probe)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.probe);
        }
    }
}
