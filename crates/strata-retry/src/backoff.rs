//! Delay schedules between retry attempts.

use rand::Rng;
use std::time::Duration;

/// Computes the delay before a retry. `attempt` is the 1-based number of the
/// attempt that just failed.
pub trait Backoff: Send + Sync {
    /// The delay to wait before attempt `attempt + 1`.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with optional full jitter.
///
/// The raw delay for attempt `n` is `base * multiplier^(n-1)`, capped at
/// `max_delay`. With jitter enabled (the default) the actual delay is drawn
/// uniformly from zero to the raw delay, which spreads out retry storms from
/// callers that failed at the same moment.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Creates a schedule starting at `base` and growing by `multiplier`,
    /// with full jitter and a 5 second cap.
    pub fn new(base: Duration, multiplier: f64) -> Self {
        Self {
            base,
            multiplier,
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }

    /// Caps the raw (pre-jitter) delay.
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Enables or disables jitter. Disabling makes delays deterministic,
    /// which is mostly useful in tests.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    fn raw_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(exponent as i32);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ExponentialBackoff {
    /// 100ms base, doubling per attempt, full jitter, 5 second cap.
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 2.0)
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt);
        if !self.jitter || raw.is_zero() {
            return raw;
        }
        let millis = raw.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }
}

/// The same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedDelay(pub Duration);

impl Backoff for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}
