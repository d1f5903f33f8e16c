//! Integration tests for the composed data-access stack.
//!
//! These drive the executor facade end to end against a scripted mock
//! backend: cache behavior, circuit breaking, retry, pool exhaustion, and
//! cancellation, the way a deployment would hit them.

#[path = "resilience/mod.rs"]
mod resilience;
