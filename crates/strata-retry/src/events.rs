//! Retry observability events.

use std::time::{Duration, Instant};
use strata_core::ComponentEvent;

/// Events emitted by a [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retryable failure was observed and another attempt was scheduled.
    RetryScheduled {
        /// Configured policy name.
        name: String,
        /// The attempt that just failed (1-based).
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
        /// Label of the error that triggered the retry.
        error_kind: &'static str,
        /// When the retry was scheduled.
        timestamp: Instant,
    },
    /// An operation succeeded after at least one retry.
    Recovered {
        /// Configured policy name.
        name: String,
        /// Total attempts made, including the successful one.
        attempts: u32,
        /// When the operation succeeded.
        timestamp: Instant,
    },
    /// The retry budget ran out.
    Exhausted {
        /// Configured policy name.
        name: String,
        /// Total attempts made.
        attempts: u32,
        /// Label of the final error.
        error_kind: &'static str,
        /// When the budget ran out.
        timestamp: Instant,
    },
}

impl ComponentEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::RetryScheduled { .. } => "retry_scheduled",
            RetryEvent::Recovered { .. } => "recovered",
            RetryEvent::Exhausted { .. } => "exhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::RetryScheduled { timestamp, .. }
            | RetryEvent::Recovered { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            RetryEvent::RetryScheduled { name, .. }
            | RetryEvent::Recovered { name, .. }
            | RetryEvent::Exhausted { name, .. } => name,
        }
    }
}
