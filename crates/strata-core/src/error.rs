//! Error taxonomy for the data-access layer.
//!
//! Every failure a caller can observe is one of the [`DataError`] variants.
//! Each kind carries a fixed retryability classification so the retry policy
//! and the circuit breaker never have to guess from message text.

use std::time::Duration;
use thiserror::Error;

/// The typed error surfaced by every operation in the data-access layer.
///
/// Callers never see a raw transport error: failures are classified at the
/// point where they occur and propagate as one of these variants. Cache
/// corruption is deliberately absent; it is handled inside the cache as a
/// miss and never reaches callers.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// Network or connection-level failure while talking to the remote
    /// service. Retryable.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
    },

    /// The call did not complete within its deadline. Retryable.
    #[error("operation timed out after {elapsed:?}")]
    Timeout {
        /// How long the call ran before the deadline fired.
        elapsed: Duration,
    },

    /// The remote service asked us to slow down. Retryable, with a longer
    /// backoff when `retry_after` is provided.
    #[error("rate limited by upstream")]
    RateLimited {
        /// Upstream-provided wait hint, if any.
        retry_after: Option<Duration>,
    },

    /// The query specification is malformed. Terminal.
    #[error("invalid query: {message}")]
    Validation {
        /// What was wrong with the request.
        message: String,
    },

    /// The caller is not allowed to perform this operation. Terminal.
    #[error("authorization failed: {message}")]
    Authorization {
        /// Why the request was rejected.
        message: String,
    },

    /// The circuit breaker for this upstream target is open and the call was
    /// rejected without touching the connection pool. Terminal for this call,
    /// but the condition self-heals once the breaker probes recovery.
    #[error("circuit for '{target}' is open")]
    CircuitOpen {
        /// The upstream target whose breaker rejected the call.
        target: String,
    },

    /// No pooled connection became available within the acquire timeout.
    /// Terminal for this call; a transient system condition.
    #[error("connection pool exhausted after waiting {waited:?}")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// A retryable error persisted through every allowed attempt.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Total attempts made, including the first.
        attempts: usize,
        /// The error observed on the final attempt.
        last: Box<DataError>,
    },
}

impl DataError {
    /// Returns `true` if the retry policy may try this operation again.
    ///
    /// Only `Transport`, `Timeout`, and `RateLimited` are retryable; every
    /// other kind propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::Transport { .. } | DataError::Timeout { .. } | DataError::RateLimited { .. }
        )
    }

    /// Returns `true` if this error must surface to the caller without retry.
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Returns `true` if this is a circuit-breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, DataError::CircuitOpen { .. })
    }

    /// Returns `true` if this is a pool acquisition timeout.
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, DataError::PoolExhausted { .. })
    }

    /// A stable label for this error kind, used for metrics and retry
    /// counters.
    pub fn kind_label(&self) -> &'static str {
        match self {
            DataError::Transport { .. } => "transport",
            DataError::Timeout { .. } => "timeout",
            DataError::RateLimited { .. } => "rate_limited",
            DataError::Validation { .. } => "validation",
            DataError::Authorization { .. } => "authorization",
            DataError::CircuitOpen { .. } => "circuit_open",
            DataError::PoolExhausted { .. } => "pool_exhausted",
            DataError::RetryExhausted { .. } => "retry_exhausted",
        }
    }

    /// Unwraps a `RetryExhausted` down to the error that exhausted it;
    /// returns `self` for every other kind.
    pub fn last_error(&self) -> &DataError {
        match self {
            DataError::RetryExhausted { last, .. } => last.last_error(),
            other => other,
        }
    }

    /// Convenience constructor for transport failures.
    pub fn transport(message: impl Into<String>) -> Self {
        DataError::Transport {
            message: message.into(),
        }
    }

    /// Convenience constructor for validation failures.
    pub fn validation(message: impl Into<String>) -> Self {
        DataError::Validation {
            message: message.into(),
        }
    }
}
