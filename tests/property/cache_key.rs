//! Property tests for cache-key canonicalization.
//!
//! Invariants tested:
//! - The key is a pure function of the logical query
//! - Filter order never changes the key
//! - Table, tenant, pagination, and sort are all part of the key

use proptest::prelude::*;
use serde_json::json;
use strata_core::{cache_key, Filter, QuerySpec, SortKey};

fn arb_filter() -> impl Strategy<Value = Filter> {
    let column = prop::sample::select(vec!["id", "status", "region", "owner_id", "price"]);
    prop_oneof![
        (column.clone(), any::<i64>()).prop_map(|(c, v)| Filter::eq(c, v)),
        (column.clone(), any::<i32>(), any::<i32>())
            .prop_map(|(c, lo, hi)| Filter::range(c, Some(json!(lo)), Some(json!(hi)))),
        (column.clone(), "[a-z]{1,8}%").prop_map(|(c, p)| Filter::like(c, p)),
        (column.clone(), prop::collection::vec(any::<i32>(), 0..4))
            .prop_map(|(c, vs)| Filter::in_set(c, vs.into_iter().map(|v| json!(v)).collect())),
        (column, "[a-z ]{1,12}").prop_map(|(c, q)| Filter::text_search(c, q)),
    ]
}

fn spec_with(filters: Vec<Filter>) -> QuerySpec {
    let mut spec = QuerySpec::table("widgets")
        .sort(SortKey::asc("id"))
        .page(25, 0);
    for filter in filters {
        spec = spec.filter(filter);
    }
    spec
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the key is deterministic for a given logical query.
    #[test]
    fn identical_specs_hash_identically(filters in prop::collection::vec(arb_filter(), 0..5)) {
        let a = spec_with(filters.clone());
        let b = spec_with(filters);
        prop_assert_eq!(cache_key(&a), cache_key(&b));
    }

    /// Property: filter order is canonicalized away.
    #[test]
    fn filter_order_does_not_change_the_key(
        (original, shuffled) in prop::collection::vec(arb_filter(), 0..6)
            .prop_flat_map(|f| (Just(f.clone()), Just(f).prop_shuffle()))
    ) {
        let a = spec_with(original);
        let b = spec_with(shuffled);
        prop_assert_eq!(cache_key(&a), cache_key(&b));
    }

    /// Property: tenants never share keys.
    #[test]
    fn tenant_scope_is_part_of_the_key(
        filters in prop::collection::vec(arb_filter(), 0..4),
        tenant_a in "[a-z]{1,8}",
        tenant_b in "[a-z]{1,8}",
    ) {
        prop_assume!(tenant_a != tenant_b);
        let a = spec_with(filters.clone()).tenant(tenant_a);
        let b = spec_with(filters).tenant(tenant_b);
        prop_assert_ne!(cache_key(&a), cache_key(&b));
    }

    /// Property: the pagination window is part of the key.
    #[test]
    fn pagination_is_part_of_the_key(
        filters in prop::collection::vec(arb_filter(), 0..4),
        offset_a in 0u64..1000,
        offset_b in 0u64..1000,
    ) {
        prop_assume!(offset_a != offset_b);
        let base = spec_with(filters);
        let a = base.clone().page(25, offset_a);
        let b = base.page(25, offset_b);
        prop_assert_ne!(cache_key(&a), cache_key(&b));
    }

    /// Property: keys are fixed-width lowercase hex (SHA-256).
    #[test]
    fn keys_are_sha256_hex(filters in prop::collection::vec(arb_filter(), 0..5)) {
        let key = cache_key(&spec_with(filters));
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
