//! Circuit breaker configuration.

use crate::circuit::CircuitState;
use crate::events::BreakerEvent;
use std::time::Duration;
use strata_core::{EventListeners, FnListener};

/// Configuration for a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Clone)]
pub struct BreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) reset_timeout: Duration,
    pub(crate) probe_budget: u32,
    pub(crate) required_probe_successes: u32,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
    pub(crate) name: String,
}

impl BreakerConfig {
    /// Creates a configuration builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// This configuration with a different breaker name. Listeners are
    /// shared, which is what a per-target registry wants.
    pub(crate) fn named(&self, name: &str) -> Self {
        let mut config = self.clone();
        config.name = name.to_string();
        config
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_threshold: u32,
    reset_timeout: Duration,
    probe_budget: u32,
    required_probe_successes: u32,
    event_listeners: EventListeners<BreakerEvent>,
    name: String,
}

impl BreakerConfigBuilder {
    /// Creates a builder with defaults.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            probe_budget: 1,
            required_probe_successes: 1,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Consecutive failures that trip the breaker open.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// How long the breaker stays open before admitting probes.
    ///
    /// Default: 30 seconds
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Maximum concurrent probes while half-open.
    ///
    /// Default: 1
    pub fn probe_budget(mut self, n: u32) -> Self {
        self.probe_budget = n;
        self
    }

    /// Probe successes required to close the breaker again.
    ///
    /// Default: 1
    pub fn required_probe_successes(mut self, n: u32) -> Self {
        self.required_probe_successes = n;
        self
    }

    /// Give this breaker a human-readable name for observability. The
    /// registry overrides this with the target name.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback for state transitions.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::StateChanged { from, to, .. } = event {
                    f(*from, *to);
                }
            }));
        self
    }

    /// Registers a callback for fail-fast rejections.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::CallRejected { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `failure_threshold`, `probe_budget`, or
    /// `required_probe_successes` is zero.
    pub fn build(self) -> BreakerConfig {
        if self.failure_threshold == 0 {
            panic!("failure_threshold must be at least 1");
        }
        if self.probe_budget == 0 {
            panic!("probe_budget must be at least 1");
        }
        if self.required_probe_successes == 0 {
            panic!("required_probe_successes must be at least 1");
        }
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            probe_budget: self.probe_budget,
            required_probe_successes: self.required_probe_successes,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
