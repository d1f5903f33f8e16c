//! Cache configuration and write options.

use crate::events::{CacheEvent, RemovalReason};
use std::time::Duration;
use strata_core::{EventListeners, FnListener};

/// When to compress a serialized payload before storing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionPolicy {
    /// Never compress.
    Never,
    /// Compress any payload of at least this many serialized bytes.
    Threshold(usize),
    /// Compress payloads of at least this many bytes, but keep the compressed
    /// form only when it actually shrinks the payload by at least 10%.
    /// Already-compressed data falls through to plain storage.
    ContentAware(usize),
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        CompressionPolicy::Threshold(512)
    }
}

/// Eviction ordering priority of a cache entry.
///
/// Lower priorities are evicted first; within a priority class eviction is
/// strict LRU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// First to go under pressure.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Kept as long as anything lower-priority remains.
    High,
}

/// Per-write options for [`CacheStore::insert`](crate::CacheStore::insert).
#[derive(Debug, Clone, Default)]
pub struct CacheWriteOptions {
    /// TTL override; the store's `default_ttl` applies when `None`.
    pub ttl: Option<Duration>,
    /// Invalidation tags to file the entry under.
    pub tags: Vec<String>,
    /// Eviction priority.
    pub priority: Priority,
}

impl CacheWriteOptions {
    /// Options with the given tags and defaults otherwise.
    pub fn tagged(tags: Vec<String>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Sets the TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the eviction priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Configuration for a [`CacheStore`](crate::CacheStore).
pub struct CacheConfig {
    pub(crate) max_bytes: usize,
    pub(crate) max_entries: usize,
    pub(crate) default_ttl: Duration,
    pub(crate) compression: CompressionPolicy,
    pub(crate) cleanup_interval: Duration,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
    pub(crate) name: String,
}

impl CacheConfig {
    /// Creates a configuration builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    max_bytes: usize,
    max_entries: usize,
    default_ttl: Duration,
    compression: CompressionPolicy,
    cleanup_interval: Duration,
    event_listeners: EventListeners<CacheEvent>,
    name: String,
}

impl CacheConfigBuilder {
    /// Creates a builder with defaults.
    pub fn new() -> Self {
        Self {
            max_bytes: 8 * 1024 * 1024,
            max_entries: 1024,
            default_ttl: Duration::from_secs(60),
            compression: CompressionPolicy::default(),
            cleanup_interval: Duration::from_secs(30),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Total byte budget across all stored payloads.
    ///
    /// Default: 8 MiB
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    /// Maximum number of entries.
    ///
    /// Default: 1024
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// TTL applied when a write does not carry its own.
    ///
    /// Default: 60 seconds
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Compression policy for stored payloads.
    ///
    /// Default: `CompressionPolicy::Threshold(512)`
    pub fn compression(mut self, policy: CompressionPolicy) -> Self {
        self.compression = policy;
        self
    }

    /// Interval of the background expiry sweep.
    ///
    /// Default: 30 seconds
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Give this store a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback for cache hits.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CacheEvent| {
                if let CacheEvent::Hit { key, .. } = event {
                    f(key);
                }
            }));
        self
    }

    /// Registers a callback for cache misses.
    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CacheEvent| {
                if let CacheEvent::Miss { key, .. } = event {
                    f(key);
                }
            }));
        self
    }

    /// Registers a callback for removals (eviction, expiry, invalidation,
    /// replacement, corruption), receiving the key and the reason.
    pub fn on_removal<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, RemovalReason) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CacheEvent| {
                if let CacheEvent::Removed { key, reason, .. } = event {
                    f(key, *reason);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CacheConfig {
        CacheConfig {
            max_bytes: self.max_bytes,
            max_entries: self.max_entries,
            default_ttl: self.default_ttl,
            compression: self.compression,
            cleanup_interval: self.cleanup_interval,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
