//! Shared building blocks for the strata data-access layer.
//!
//! This crate carries everything the component crates have in common:
//!
//! - [`DataError`]: the error taxonomy surfaced to callers, with a fixed
//!   retryable/terminal classification per kind.
//! - The event system ([`ComponentEvent`], [`EventListeners`], [`FnListener`])
//!   used by the cache, pool, breaker, and retry crates for observability
//!   callbacks.
//! - The logical query model ([`QuerySpec`], [`Filter`], [`Statement`],
//!   [`ResultSet`]) exchanged with the remote data service.
//! - Deterministic cache-key derivation ([`cache_key`]) and tag derivation
//!   ([`cache_tags`]) from a query specification.

mod error;
mod events;
mod key;
mod query;

pub use error::DataError;
pub use events::{BoxedEventListener, ComponentEvent, EventListener, EventListeners, FnListener};
pub use key::{cache_key, cache_tags, entity_tags};
pub use query::{
    Direction, ExecutionResult, Filter, Page, QuerySpec, ResultSet, SortKey, Statement,
};
