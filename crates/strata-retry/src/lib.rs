//! Retry policy for the strata data-access layer.
//!
//! A [`RetryPolicy`] re-runs an async operation while it fails with a
//! retryable error (`Transport`, `Timeout`, `RateLimited`). Terminal errors
//! return immediately and unchanged; exhausting the budget wraps the final
//! error in `DataError::RetryExhausted` so callers can still see what
//! ultimately went wrong.
//!
//! Delays come from a [`Backoff`] schedule, except that a `RateLimited` error
//! carrying a server-provided `retry_after` hint overrides the schedule for
//! that attempt.
//!
//! # Examples
//!
//! ```no_run
//! use strata_retry::{ExponentialBackoff, RetryConfig, RetryPolicy};
//! use std::time::Duration;
//! # use strata_core::DataError;
//! # async fn example() -> Result<u64, DataError> {
//! let policy = RetryPolicy::new(
//!     RetryConfig::builder()
//!         .max_retries(3)
//!         .backoff(ExponentialBackoff::new(Duration::from_millis(100), 2.0))
//!         .name("orders")
//!         .build(),
//! );
//!
//! policy
//!     .execute(|_attempt| async { Ok::<_, DataError>(42u64) })
//!     .await
//! # }
//! ```

mod backoff;
mod config;
mod events;

pub use backoff::{Backoff, ExponentialBackoff, FixedDelay};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strata_core::DataError;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Runs operations under a retry budget. Cheap to clone; clones share the
/// retry counters.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    counts: Arc<Mutex<HashMap<&'static str, u64>>>,
}

impl RetryPolicy {
    /// Creates a policy from the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or the budget runs out.
    ///
    /// `op` receives the 1-based attempt number. A budget of `max_retries`
    /// allows `max_retries + 1` attempts in total.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, DataError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        self.run(None, op).await
    }

    /// Like [`execute`](Self::execute), but stops scheduling attempts once
    /// `token` is cancelled. Cancellation during a backoff sleep returns the
    /// most recent error; an attempt already in flight runs to completion.
    pub async fn execute_with_cancel<T, F, Fut>(
        &self,
        token: &CancellationToken,
        op: F,
    ) -> Result<T, DataError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        self.run(Some(token), op).await
    }

    async fn run<T, F, Fut>(
        &self,
        token: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, DataError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        let config = &self.config;
        let mut attempt: u32 = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        config.event_listeners.emit(&RetryEvent::Recovered {
                            name: config.name.clone(),
                            attempts: attempt,
                            timestamp: Instant::now(),
                        });

                        #[cfg(feature = "tracing")]
                        debug!(policy = %config.name, attempts = attempt, "recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    if attempt > config.max_retries {
                        config.event_listeners.emit(&RetryEvent::Exhausted {
                            name: config.name.clone(),
                            attempts: attempt,
                            error_kind: error.kind_label(),
                            timestamp: Instant::now(),
                        });

                        #[cfg(feature = "metrics")]
                        counter!("retry_exhausted_total", "policy" => config.name.clone())
                            .increment(1);

                        #[cfg(feature = "tracing")]
                        warn!(
                            policy = %config.name,
                            attempts = attempt,
                            error = %error,
                            "retry budget exhausted"
                        );

                        return Err(DataError::RetryExhausted {
                            attempts: attempt as usize,
                            last: Box::new(error),
                        });
                    }

                    let delay = self.delay_for(&error, attempt);
                    *self
                        .counts
                        .lock()
                        .unwrap()
                        .entry(error.kind_label())
                        .or_insert(0) += 1;
                    config.event_listeners.emit(&RetryEvent::RetryScheduled {
                        name: config.name.clone(),
                        attempt,
                        delay,
                        error_kind: error.kind_label(),
                        timestamp: Instant::now(),
                    });

                    #[cfg(feature = "metrics")]
                    counter!(
                        "retry_attempts_total",
                        "policy" => config.name.clone(),
                        "error" => error.kind_label()
                    )
                    .increment(1);

                    #[cfg(feature = "tracing")]
                    debug!(
                        policy = %config.name,
                        attempt,
                        ?delay,
                        error = %error,
                        "retrying"
                    );

                    match token {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => return Err(error),
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// A server-provided rate-limit hint overrides the backoff schedule.
    fn delay_for(&self, error: &DataError, attempt: u32) -> Duration {
        match error {
            DataError::RateLimited {
                retry_after: Some(hint),
            } => *hint,
            _ => self.config.backoff.delay(attempt),
        }
    }

    /// The policy's configured retry budget.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// How many retries have been scheduled, by error kind.
    pub fn counts_by_kind(&self) -> HashMap<&'static str, u64> {
        self.counts.lock().unwrap().clone()
    }
}
