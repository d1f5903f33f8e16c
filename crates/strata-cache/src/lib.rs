//! In-process cache store for the strata data-access layer.
//!
//! A single multi-tier store used by every other component to avoid redundant
//! remote calls:
//!
//! - **LRU + priority eviction**: a byte budget and an entry-count budget,
//!   enforced synchronously before a new entry is admitted. Low-priority
//!   entries are evicted first, then normal, then high; strict LRU breaks
//!   ties within a class.
//! - **TTL**: lazy expiry on lookup plus a periodic background sweep.
//! - **Compression**: payloads at or above a configurable threshold are
//!   stored gzip-compressed; see [`CompressionPolicy`].
//! - **Tag invalidation**: entries are filed under logical tags (entity type,
//!   entity id) and can be removed in bulk when the underlying data changes.
//!
//! Operations never suspend; the index is guarded by a plain mutex and all
//! work is in-memory. Corrupted payloads are treated as misses and evicted,
//! never returned.
//!
//! # Examples
//!
//! ```
//! use strata_cache::{CacheConfig, CacheStore, CacheWriteOptions};
//! use std::time::Duration;
//!
//! let store = CacheStore::new(
//!     CacheConfig::builder()
//!         .max_bytes(1024 * 1024)
//!         .max_entries(500)
//!         .default_ttl(Duration::from_secs(60))
//!         .name("queries")
//!         .build(),
//! );
//!
//! store.insert(
//!     "k1",
//!     &vec!["row-1", "row-2"],
//!     CacheWriteOptions::tagged(vec!["robots".into()]),
//! );
//! let rows: Option<Vec<String>> = store.get("k1");
//! assert!(rows.is_some());
//!
//! assert_eq!(store.invalidate_by_tag("robots"), 1);
//! assert!(store.get::<Vec<String>>("k1").is_none());
//! ```

mod compress;
mod config;
mod events;
mod store;

pub use config::{
    CacheConfig, CacheConfigBuilder, CacheWriteOptions, CompressionPolicy, Priority,
};
pub use events::{CacheEvent, RemovalReason};

use crate::compress::Payload;
use crate::store::{Entry, Index};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Point-in-time counters for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups served from the store.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Entries removed to satisfy a budget.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Entries removed by tag invalidation.
    pub invalidations: u64,
    /// Live entries.
    pub entries: usize,
    /// Bytes currently stored.
    pub bytes: usize,
}

/// The cache store.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct CacheStore {
    config: CacheConfig,
    index: Mutex<Index>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

enum Lookup {
    Absent,
    Expired,
    Live(Payload),
}

impl CacheStore {
    /// Creates a store with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            index: Mutex::new(Index::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// The configured store name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Looks up `key`, decoding the stored payload.
    ///
    /// Promotes the entry to most-recently-used on hit. Expired entries are
    /// removed lazily and reported as misses even before the sweeper runs.
    /// A payload that fails to decompress or decode is evicted and reported
    /// as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();

        let mut guard = self.index.lock().unwrap();
        let lookup = match guard.entry_mut(key) {
            None => Lookup::Absent,
            Some(entry) if entry.expires_at <= now => Lookup::Expired,
            Some(entry) => {
                entry.last_used = now;
                Lookup::Live(entry.payload.clone())
            }
        };

        match lookup {
            Lookup::Absent => {
                drop(guard);
                self.record_miss(key);
                None
            }
            Lookup::Expired => {
                guard.remove(key);
                self.publish_gauges(&guard);
                drop(guard);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.emit_removed(key, RemovalReason::Expired);
                self.record_miss(key);
                None
            }
            Lookup::Live(payload) => {
                let decoded = payload
                    .decode()
                    .ok()
                    .and_then(|bytes| serde_json::from_slice(&bytes).ok());
                match decoded {
                    Some(value) => {
                        drop(guard);
                        self.record_hit(key);
                        Some(value)
                    }
                    None => {
                        // Fail closed: a payload we cannot read is gone.
                        guard.remove(key);
                        self.publish_gauges(&guard);
                        drop(guard);
                        self.emit_removed(key, RemovalReason::Corrupt);
                        self.record_miss(key);
                        None
                    }
                }
            }
        }
    }

    /// Stores `value` under `key`.
    ///
    /// Serializes (and compresses, per policy) before admission; evicts
    /// least-recently-used entries of the lowest present priority until both
    /// budgets hold. Serialization or compression failures drop the write
    /// rather than storing anything questionable. A payload that alone
    /// exceeds the byte budget is not admitted.
    pub fn insert<T: Serialize>(&self, key: &str, value: &T, opts: CacheWriteOptions) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                warn!(cache = %self.config.name, key, error = %_e, "value not serializable; skipping cache write");
                return;
            }
        };

        let payload = match compress::encode(self.config.compression, bytes) {
            Ok(payload) => payload,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                warn!(cache = %self.config.name, key, error = %_e, "compression failed; skipping cache write");
                return;
            }
        };

        let size_bytes = payload.len();
        if size_bytes > self.config.max_bytes {
            #[cfg(feature = "tracing")]
            debug!(cache = %self.config.name, key, size_bytes, "payload exceeds byte budget; not admitted");
            return;
        }

        let now = Instant::now();
        let compressed = payload.is_compressed();
        let entry = Entry {
            payload,
            tags: opts.tags,
            created_at: now,
            expires_at: now + opts.ttl.unwrap_or(self.config.default_ttl),
            last_used: now,
            size_bytes,
            priority: opts.priority,
        };

        let (replaced, evicted) = {
            let mut guard = self.index.lock().unwrap();
            let result = guard.insert(
                key.to_string(),
                entry,
                self.config.max_bytes,
                self.config.max_entries,
            );
            self.publish_gauges(&guard);
            result
        };

        if replaced.is_some() {
            self.emit_removed(key, RemovalReason::Replaced);
        }
        for victim in &evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.emit_removed(victim, RemovalReason::Evicted);
        }

        #[cfg(feature = "metrics")]
        {
            if !evicted.is_empty() {
                counter!("cache_evictions_total", "cache" => self.config.name.clone())
                    .increment(evicted.len() as u64);
            }
        }

        self.config.event_listeners.emit(&CacheEvent::Inserted {
            name: self.config.name.clone(),
            key: key.to_string(),
            size_bytes,
            compressed,
            timestamp: Instant::now(),
        });
    }

    /// Removes every entry filed under `tag`; returns how many were removed.
    ///
    /// Idempotent: a second call with the same tag removes nothing.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let removed = {
            let mut guard = self.index.lock().unwrap();
            let keys = guard.keys_with_tag(tag);
            for key in &keys {
                guard.remove(key);
            }
            self.publish_gauges(&guard);
            keys
        };

        for key in &removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            self.emit_removed(key, RemovalReason::Invalidated);
        }

        #[cfg(feature = "metrics")]
        if !removed.is_empty() {
            counter!("cache_invalidations_total", "cache" => self.config.name.clone())
                .increment(removed.len() as u64);
        }

        removed.len()
    }

    /// Removes every expired entry; returns how many were removed.
    ///
    /// Called by the background sweeper, and safe to call directly.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut guard = self.index.lock().unwrap();
            let keys = guard.expired_keys(now);
            for key in &keys {
                guard.remove(key);
            }
            self.publish_gauges(&guard);
            keys
        };

        for key in &removed {
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.emit_removed(key, RemovalReason::Expired);
        }

        removed.len()
    }

    /// Current number of live entries.
    pub fn len(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    /// Returns `true` when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently stored across all payloads.
    pub fn total_bytes(&self) -> usize {
        self.index.lock().unwrap().total_bytes()
    }

    /// Drops every entry without emitting removal events.
    pub fn clear(&self) {
        let mut guard = self.index.lock().unwrap();
        guard.clear();
        self.publish_gauges(&guard);
    }

    /// A snapshot of the store's counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let guard = self.index.lock().unwrap();
            (guard.len(), guard.total_bytes())
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries,
            bytes,
        }
    }

    /// Spawns the periodic expiry sweep on the current tokio runtime.
    ///
    /// Runs every `cleanup_interval` until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let interval = store.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let _removed = store.cleanup_expired();
                #[cfg(feature = "tracing")]
                if _removed > 0 {
                    debug!(cache = %store.config.name, removed = _removed, "expiry sweep");
                }
            }
        })
    }

    fn record_hit(&self, key: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!("cache_requests_total", "cache" => self.config.name.clone(), "result" => "hit")
            .increment(1);
        self.config.event_listeners.emit(&CacheEvent::Hit {
            name: self.config.name.clone(),
            key: key.to_string(),
            timestamp: Instant::now(),
        });
    }

    fn record_miss(&self, key: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!("cache_requests_total", "cache" => self.config.name.clone(), "result" => "miss")
            .increment(1);
        self.config.event_listeners.emit(&CacheEvent::Miss {
            name: self.config.name.clone(),
            key: key.to_string(),
            timestamp: Instant::now(),
        });
    }

    fn emit_removed(&self, key: &str, reason: RemovalReason) {
        self.config.event_listeners.emit(&CacheEvent::Removed {
            name: self.config.name.clone(),
            key: key.to_string(),
            reason,
            timestamp: Instant::now(),
        });
    }

    #[allow(unused_variables)]
    fn publish_gauges(&self, index: &Index) {
        #[cfg(feature = "metrics")]
        {
            gauge!("cache_entries", "cache" => self.config.name.clone()).set(index.len() as f64);
            gauge!("cache_bytes", "cache" => self.config.name.clone())
                .set(index.total_bytes() as f64);
        }
    }
}
