//! The logical query model exchanged with the remote data service.
//!
//! Filters are a closed set of operator variants rather than free-form typed
//! values, so every filter has a defined serialization into the cache-key
//! normalization and there is no "any"-typed escape hatch.

use crate::DataError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single filter predicate applied to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Exact equality.
    Eq {
        /// Column the predicate applies to.
        column: String,
        /// The value to compare against.
        value: Value,
    },
    /// Inclusive range; either bound may be open.
    Range {
        /// Column the predicate applies to.
        column: String,
        /// Lower bound, if any.
        min: Option<Value>,
        /// Upper bound, if any.
        max: Option<Value>,
    },
    /// SQL-LIKE style pattern match.
    Like {
        /// Column the predicate applies to.
        column: String,
        /// The match pattern.
        pattern: String,
    },
    /// Membership in a fixed set of values.
    InSet {
        /// Column the predicate applies to.
        column: String,
        /// The allowed values.
        values: Vec<Value>,
    },
    /// Full-text search over a column.
    TextSearch {
        /// Column the predicate applies to.
        column: String,
        /// The search query.
        query: String,
    },
}

impl Filter {
    /// Equality filter.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Range filter with optional bounds.
    pub fn range(
        column: impl Into<String>,
        min: Option<Value>,
        max: Option<Value>,
    ) -> Self {
        Filter::Range {
            column: column.into(),
            min,
            max,
        }
    }

    /// Pattern-match filter.
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    /// Set-membership filter.
    pub fn in_set(column: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::InSet {
            column: column.into(),
            values,
        }
    }

    /// Text-search filter.
    pub fn text_search(column: impl Into<String>, query: impl Into<String>) -> Self {
        Filter::TextSearch {
            column: column.into(),
            query: query.into(),
        }
    }

    /// The column this filter applies to.
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. }
            | Filter::Range { column, .. }
            | Filter::Like { column, .. }
            | Filter::InSet { column, .. }
            | Filter::TextSearch { column, .. } => column,
        }
    }

    /// Lower-case operator tag, part of the canonical cache-key encoding.
    pub fn operator(&self) -> &'static str {
        match self {
            Filter::Eq { .. } => "eq",
            Filter::Range { .. } => "range",
            Filter::Like { .. } => "like",
            Filter::InSet { .. } => "in",
            Filter::TextSearch { .. } => "text",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl Direction {
    /// Lower-case label used in the canonical cache-key encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// One sort key of a query's ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Column to order by.
    pub column: String,
    /// Direction to order in.
    pub direction: Direction,
}

impl SortKey {
    /// Ascending sort on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending sort on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum number of rows to return.
    pub limit: u64,
    /// Number of rows to skip.
    pub offset: u64,
}

/// A logical read query: table, filters, ordering, and pagination.
///
/// Built with the fluent methods; `cacheable` defaults to `true`.
///
/// ```
/// use strata_core::{Filter, QuerySpec, SortKey};
///
/// let spec = QuerySpec::table("robots")
///     .filter(Filter::eq("id", "r1"))
///     .sort(SortKey::asc("name"))
///     .page(50, 0);
/// assert!(spec.cacheable);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// The table to query.
    pub table: String,
    /// Filter predicates, all of which must hold.
    pub filters: Vec<Filter>,
    /// Ordering, applied in sequence.
    pub sort: Vec<SortKey>,
    /// Pagination window, if any.
    pub page: Option<Page>,
    /// Tenant scope; part of the cache key so tenants never share entries.
    pub tenant: Option<String>,
    /// Whether the result may be served from and stored into the cache.
    pub cacheable: bool,
}

impl QuerySpec {
    /// Starts a query against `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            sort: Vec::new(),
            page: None,
            tenant: None,
            cacheable: true,
        }
    }

    /// Adds a filter predicate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a sort key.
    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Sets the pagination window.
    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.page = Some(Page { limit, offset });
        self
    }

    /// Scopes the query to a tenant.
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Bypasses the cache for this query.
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

/// An operation issued to the remote data service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Read rows.
    Query(QuerySpec),
    /// Insert rows.
    Insert {
        /// Target table.
        table: String,
        /// Rows to insert.
        rows: Vec<Value>,
    },
    /// Update rows matching the filters.
    Update {
        /// Target table.
        table: String,
        /// Which rows to update.
        filters: Vec<Filter>,
        /// Column/value pairs to set.
        values: Value,
    },
    /// Delete rows matching the filters.
    Delete {
        /// Target table.
        table: String,
        /// Which rows to delete.
        filters: Vec<Filter>,
    },
    /// Insert-or-update a batch of rows.
    UpsertBatch {
        /// Target table.
        table: String,
        /// Rows to upsert.
        rows: Vec<Value>,
    },
}

impl Statement {
    /// The table this statement touches.
    pub fn table(&self) -> &str {
        match self {
            Statement::Query(spec) => &spec.table,
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. }
            | Statement::UpsertBatch { table, .. } => table,
        }
    }

    /// Returns `true` for statements that mutate remote state.
    pub fn is_write(&self) -> bool {
        !matches!(self, Statement::Query(_))
    }
}

/// Rows returned by a read query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// The matching rows, as decoded JSON objects.
    pub rows: Vec<Value>,
    /// Total matching rows before pagination, when the service reports it.
    pub total_count: Option<u64>,
}

impl ResultSet {
    /// A result set holding `rows` with no total count.
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            total_count: None,
        }
    }
}

/// What the remote service returned for a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// A read produced rows.
    Rows(ResultSet),
    /// A write affected this many rows.
    Affected(u64),
}

impl ExecutionResult {
    /// Extracts the result set, failing if the statement was a write.
    pub fn into_rows(self) -> Result<ResultSet, DataError> {
        match self {
            ExecutionResult::Rows(rs) => Ok(rs),
            ExecutionResult::Affected(_) => Err(DataError::validation(
                "statement returned an affected-row count, not rows",
            )),
        }
    }

    /// Extracts the affected-row count, failing if the statement was a read.
    pub fn affected(self) -> Result<u64, DataError> {
        match self {
            ExecutionResult::Affected(n) => Ok(n),
            ExecutionResult::Rows(_) => Err(DataError::validation(
                "statement returned rows, not an affected-row count",
            )),
        }
    }
}
