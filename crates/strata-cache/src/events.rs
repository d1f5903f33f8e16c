//! Cache observability events.

use std::time::Instant;
use strata_core::ComponentEvent;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The entry's TTL elapsed.
    Expired,
    /// The entry was evicted to make room under the byte or count budget.
    Evicted,
    /// The entry matched an invalidated tag.
    Invalidated,
    /// The entry was overwritten by a newer value for the same key.
    Replaced,
    /// The stored payload failed to decompress or decode.
    Corrupt,
}

impl RemovalReason {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Expired => "expired",
            RemovalReason::Evicted => "evicted",
            RemovalReason::Invalidated => "invalidated",
            RemovalReason::Replaced => "replaced",
            RemovalReason::Corrupt => "corrupt",
        }
    }
}

/// Events emitted by a [`CacheStore`](crate::CacheStore).
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A lookup was served from the cache.
    Hit {
        /// Configured store name.
        name: String,
        /// The key that hit.
        key: String,
        /// When the lookup happened.
        timestamp: Instant,
    },
    /// A lookup found nothing usable.
    Miss {
        /// Configured store name.
        name: String,
        /// The key that missed.
        key: String,
        /// When the lookup happened.
        timestamp: Instant,
    },
    /// A value was admitted to the store.
    Inserted {
        /// Configured store name.
        name: String,
        /// The key that was stored.
        key: String,
        /// Stored payload size in bytes (after compression, if any).
        size_bytes: usize,
        /// Whether the payload was stored compressed.
        compressed: bool,
        /// When the insert happened.
        timestamp: Instant,
    },
    /// An entry was removed.
    Removed {
        /// Configured store name.
        name: String,
        /// The key that was removed.
        key: String,
        /// Why it was removed.
        reason: RemovalReason,
        /// When the removal happened.
        timestamp: Instant,
    },
}

impl ComponentEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Inserted { .. } => "inserted",
            CacheEvent::Removed { .. } => "removed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Inserted { timestamp, .. }
            | CacheEvent::Removed { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            CacheEvent::Hit { name, .. }
            | CacheEvent::Miss { name, .. }
            | CacheEvent::Inserted { name, .. }
            | CacheEvent::Removed { name, .. } => name,
        }
    }
}
