//! Retry policy configuration.

use crate::backoff::{Backoff, ExponentialBackoff};
use crate::events::RetryEvent;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{EventListeners, FnListener};

/// Configuration for a [`RetryPolicy`](crate::RetryPolicy).
#[derive(Clone)]
pub struct RetryConfig {
    pub(crate) max_retries: u32,
    pub(crate) backoff: Arc<dyn Backoff>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl RetryConfig {
    /// Creates a configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    max_retries: u32,
    backoff: Arc<dyn Backoff>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl RetryConfigBuilder {
    /// Creates a builder with defaults.
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            backoff: Arc::new(ExponentialBackoff::default()),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Retries allowed after the initial attempt. Zero disables retrying.
    ///
    /// Default: 3
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// The delay schedule between attempts.
    ///
    /// Default: [`ExponentialBackoff::default`] (100ms base, doubling,
    /// full jitter, 5s cap)
    pub fn backoff<B: Backoff + 'static>(mut self, backoff: B) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Give this policy a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback for each scheduled retry, receiving the failed
    /// attempt number and the delay before the next one.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::RetryScheduled { attempt, delay, .. } = event {
                    f(*attempt, *delay);
                }
            }));
        self
    }

    /// Registers a callback for retry-budget exhaustion, receiving the total
    /// number of attempts made.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Exhausted { attempts, .. } = event {
                    f(*attempts);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            backoff: self.backoff,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
