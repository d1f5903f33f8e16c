//! The cache index: entries, tag index, and eviction bookkeeping.
//!
//! Everything here runs under the store's mutex and is purely synchronous;
//! the public wrapper in `lib.rs` handles serialization, events, and metrics.

use crate::compress::Payload;
use crate::config::Priority;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// A live cache entry.
pub(crate) struct Entry {
    pub(crate) payload: Payload,
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: Instant,
    pub(crate) expires_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) size_bytes: usize,
    pub(crate) priority: Priority,
}

/// Key index plus an inverted tag index, with running byte accounting.
#[derive(Default)]
pub(crate) struct Index {
    entries: HashMap<String, Entry>,
    by_tag: HashMap<String, HashSet<String>>,
    total_bytes: usize,
}

impl Index {
    pub(crate) fn entry_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Removes an entry, unlinking it from the tag index.
    pub(crate) fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// Inserts an entry, evicting until both budgets hold.
    ///
    /// Returns the replaced previous value for the key (if any) and the keys
    /// evicted to make room. The caller guarantees `entry.size_bytes` fits the
    /// byte budget on its own.
    pub(crate) fn insert(
        &mut self,
        key: String,
        entry: Entry,
        max_bytes: usize,
        max_entries: usize,
    ) -> (Option<Entry>, Vec<String>) {
        let replaced = self.remove(&key);

        let mut evicted = Vec::new();
        while self.total_bytes + entry.size_bytes > max_bytes || self.entries.len() >= max_entries {
            match self.pick_victim() {
                Some(victim) => {
                    self.remove(&victim);
                    evicted.push(victim);
                }
                None => break,
            }
        }

        for tag in &entry.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.total_bytes += entry.size_bytes;
        self.entries.insert(key, entry);

        (replaced, evicted)
    }

    /// The eviction victim: lowest priority class present, then strict LRU.
    fn pick_victim(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| (e.priority, e.last_used))
            .map(|(k, _)| k.clone())
    }

    /// Keys filed under `tag`.
    pub(crate) fn keys_with_tag(&self, tag: &str) -> Vec<String> {
        self.by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys whose entries have expired as of `now`.
    pub(crate) fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.by_tag.clear();
        self.total_bytes = 0;
    }
}
