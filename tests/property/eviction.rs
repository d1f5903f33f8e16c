//! Property tests for cache budgets.
//!
//! Invariants tested:
//! - Total stored bytes never exceed `max_bytes`, whatever the insert order
//! - The entry count never exceeds `max_entries`
//! - Oversized values are refused without evicting anything

use proptest::prelude::*;
use std::time::Duration;
use strata_cache::{CacheConfig, CacheStore, CacheWriteOptions, CompressionPolicy};

fn store(max_bytes: usize, max_entries: usize) -> CacheStore {
    CacheStore::new(
        CacheConfig::builder()
            .max_bytes(max_bytes)
            .max_entries(max_entries)
            // Keep sizes predictable: random strings barely compress anyway.
            .compression(CompressionPolicy::Never)
            .default_ttl(Duration::from_secs(60))
            .build(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: budgets hold after every single insert.
    #[test]
    fn budgets_hold_under_arbitrary_insert_sequences(
        values in prop::collection::vec("[a-zA-Z0-9]{1,400}", 1..40),
    ) {
        let store = store(2048, 16);
        for (i, value) in values.iter().enumerate() {
            store.insert(&format!("key-{i}"), value, CacheWriteOptions::default());
            prop_assert!(store.total_bytes() <= 2048,
                "byte budget exceeded: {}", store.total_bytes());
            prop_assert!(store.len() <= 16,
                "entry budget exceeded: {}", store.len());
        }
    }

    /// Property: repeated writes to the same key replace, never accumulate.
    #[test]
    fn rewrites_do_not_leak_bytes(
        values in prop::collection::vec("[a-z]{1,200}", 2..20),
    ) {
        let store = store(4096, 8);
        for value in &values {
            store.insert("hot-key", value, CacheWriteOptions::default());
        }
        prop_assert_eq!(store.len(), 1);
        prop_assert!(store.total_bytes() <= 4096);
        let read: Option<String> = store.get("hot-key");
        prop_assert_eq!(read.as_deref(), values.last().map(|s| s.as_str()));
    }

    /// Property: a value that cannot fit is refused and the store is intact.
    #[test]
    fn oversized_values_are_refused(
        big in "[a-z]{600,900}",
        small in "[a-z]{1,50}",
    ) {
        let store = store(512, 16);
        store.insert("small", &small, CacheWriteOptions::default());
        let before = store.total_bytes();

        store.insert("big", &big, CacheWriteOptions::default());
        let read: Option<String> = store.get("big");
        prop_assert!(read.is_none());
        prop_assert_eq!(store.total_bytes(), before);
        let kept: Option<String> = store.get("small");
        prop_assert_eq!(kept.as_deref(), Some(small.as_str()));
    }
}
