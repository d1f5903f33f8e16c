//! Circuit breaker observability events.

use crate::circuit::CircuitState;
use std::time::Instant;
use strata_core::ComponentEvent;

/// Events emitted by a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker moved between states.
    StateChanged {
        /// Breaker name (usually the protected target).
        name: String,
        /// State before the transition.
        from: CircuitState,
        /// State after the transition.
        to: CircuitState,
        /// When the transition happened.
        timestamp: Instant,
    },
    /// A call was rejected without reaching the target.
    CallRejected {
        /// Breaker name.
        name: String,
        /// State at rejection time (`Open`, or `HalfOpen` with the probe
        /// budget spent).
        state: CircuitState,
        /// When the rejection happened.
        timestamp: Instant,
    },
    /// A half-open probe was admitted.
    ProbeAdmitted {
        /// Breaker name.
        name: String,
        /// When the probe started.
        timestamp: Instant,
    },
}

impl ComponentEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::StateChanged { .. } => "state_changed",
            BreakerEvent::CallRejected { .. } => "call_rejected",
            BreakerEvent::ProbeAdmitted { .. } => "probe_admitted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BreakerEvent::StateChanged { timestamp, .. }
            | BreakerEvent::CallRejected { timestamp, .. }
            | BreakerEvent::ProbeAdmitted { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            BreakerEvent::StateChanged { name, .. }
            | BreakerEvent::CallRejected { name, .. }
            | BreakerEvent::ProbeAdmitted { name, .. } => name,
        }
    }
}
