//! Circuit breaker for the strata data-access layer.
//!
//! A breaker protects one remote target. It counts consecutive failures while
//! `Closed` and trips `Open` at the configured threshold; open calls fail
//! fast with `DataError::CircuitOpen` and never touch the connection pool.
//! After `reset_timeout` the breaker turns `HalfOpen` and admits a bounded
//! budget of probe calls; enough probe successes close it, a single probe
//! failure reopens it with a fresh timer.
//!
//! Outcomes are reported through a [`CallGuard`] so the accounting survives
//! early returns: a guard dropped without settling (cancellation, pool
//! exhaustion, validation failure) is neutral and returns its probe slot.
//!
//! [`BreakerRegistry`] hands out one breaker per target so an unhealthy
//! `orders` backend cannot trip the breaker guarding `users`.
//!
//! # Examples
//!
//! ```
//! use strata_circuitbreaker::{BreakerConfig, CircuitBreaker};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     BreakerConfig::builder()
//!         .failure_threshold(5)
//!         .reset_timeout(Duration::from_secs(30))
//!         .name("orders")
//!         .build(),
//! );
//!
//! let guard = breaker.try_acquire().expect("closed breakers admit calls");
//! // ... perform the protected call ...
//! guard.success();
//! ```

mod circuit;
mod config;
mod events;

pub use circuit::{BreakerStats, CallGuard, CircuitBreaker, CircuitState};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use events::BreakerEvent;

use std::collections::HashMap;
use std::sync::Mutex;

/// Lazily creates and caches one [`CircuitBreaker`] per target name.
///
/// Every breaker is cloned from the same template configuration, with its
/// name replaced by the target.
pub struct BreakerRegistry {
    template: BreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Creates a registry that stamps breakers from `template`.
    pub fn new(template: BreakerConfig) -> Self {
        Self {
            template,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// The breaker for `target`, created on first use.
    pub fn breaker(&self, target: &str) -> CircuitBreaker {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(target.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.template.named(target)))
            .clone()
    }

    /// Stats for every breaker created so far.
    pub fn stats(&self) -> HashMap<String, BreakerStats> {
        let breakers = self.breakers.lock().unwrap();
        breakers
            .iter()
            .map(|(target, breaker)| (target.clone(), breaker.stats()))
            .collect()
    }
}
