//! Deterministic cache-key and tag derivation.
//!
//! Two logically identical queries must always hash to the same key, so the
//! encoding normalizes everything that can vary without changing meaning:
//! filters are sorted by column and operator tag, operator tags are
//! lower-case, and the tenant scope is folded in explicitly.

use crate::query::{Filter, QuerySpec};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes the deterministic cache key for a query specification.
///
/// The key is the SHA-256 hex digest of a canonical encoding of
/// (table, tenant, normalized filters, sort, pagination).
pub fn cache_key(spec: &QuerySpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"table=");
    hasher.update(spec.table.as_bytes());
    hasher.update(b";tenant=");
    if let Some(tenant) = &spec.tenant {
        hasher.update(tenant.as_bytes());
    }

    let mut filters: Vec<&Filter> = spec.filters.iter().collect();
    filters.sort_by(|a, b| {
        a.column()
            .cmp(b.column())
            .then(a.operator().cmp(b.operator()))
            .then(encode_filter(a).cmp(&encode_filter(b)))
    });
    for filter in filters {
        hasher.update(b";filter=");
        hasher.update(encode_filter(filter).as_bytes());
    }

    for key in &spec.sort {
        hasher.update(b";sort=");
        hasher.update(key.column.as_bytes());
        hasher.update(b":");
        hasher.update(key.direction.as_str().as_bytes());
    }

    if let Some(page) = &spec.page {
        hasher.update(format!(";page={}:{}", page.limit, page.offset).as_bytes());
    }

    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// serde_json's default map is ordered, so value encoding is already canonical.
fn encode_filter(filter: &Filter) -> String {
    match filter {
        Filter::Eq { column, value } => format!("eq({column},{value})"),
        Filter::Range { column, min, max } => format!(
            "range({column},{},{})",
            min.as_ref().map(Value::to_string).unwrap_or_default(),
            max.as_ref().map(Value::to_string).unwrap_or_default(),
        ),
        Filter::Like { column, pattern } => format!("like({column},{pattern})"),
        Filter::InSet { column, values } => {
            let mut encoded: Vec<String> = values.iter().map(Value::to_string).collect();
            encoded.sort();
            format!("in({column},[{}])", encoded.join(","))
        }
        Filter::TextSearch { column, query } => format!("text({column},{query})"),
    }
}

/// Derives the invalidation tags under which a cached query result is filed:
/// the table itself plus one `table:id` tag per entity id in the filters.
pub fn cache_tags(spec: &QuerySpec) -> Vec<String> {
    let mut tags = vec![spec.table.clone()];
    tags.extend(entity_tags(&spec.table, &spec.filters));
    tags
}

/// The `table:id` tags implied by equality filters on id columns.
///
/// Only `Eq` filters on a column named `id` or ending in `_id` identify an
/// entity; other filters constrain a scan and only the table tag applies.
pub fn entity_tags(table: &str, filters: &[Filter]) -> Vec<String> {
    filters
        .iter()
        .filter_map(|f| match f {
            Filter::Eq { column, value } if column == "id" || column.ends_with("_id") => {
                Some(format!("{}:{}", table, plain(value)))
            }
            _ => None,
        })
        .collect()
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
