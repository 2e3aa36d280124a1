//! The generic record store interface.
//!
//! The hosted backend exposes CRUD over named tables with equality
//! filters, ordering, and nested selects. This module defines the
//! client-side contract plus the query types shared by every
//! implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{BackendError, Result};

/// A record store operation, used for observation and fault injection
/// in the in-memory implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOp {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

/// An equality filter on a row column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    /// Creates a `column = value` filter.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Result ordering by a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    /// Ascending order on the given column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    /// Descending order on the given column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Embeds related rows under a field of each selected row, the
/// client-side analogue of the hosted service's nested selects.
///
/// For each parent row, rows of `table` where `row[foreign_key] ==
/// parent[parent_key]` are attached under `field` — as an array when
/// `many`, otherwise as the first match or null.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub table: String,
    pub foreign_key: String,
    pub parent_key: String,
    pub field: String,
    pub many: bool,
}

impl JoinSpec {
    /// Embeds all matching child rows as an array.
    pub fn many(
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        parent_key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            foreign_key: foreign_key.into(),
            parent_key: parent_key.into(),
            field: field.into(),
            many: true,
        }
    }

    /// Embeds the single matching row, or null when absent.
    pub fn one(
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        parent_key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            foreign_key: foreign_key.into(),
            parent_key: parent_key.into(),
            field: field.into(),
            many: false,
        }
    }
}

/// A select query: equality filters, optional ordering, embed-joins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub joins: Vec<JoinSpec>,
}

impl SelectQuery {
    /// Creates an empty query matching all rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the result ordering.
    pub fn order(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Adds an embed-join.
    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }
}

/// Core trait for record store implementations.
///
/// Rows are JSON objects. Every call may fail with a [`BackendError`]
/// carrying the service's message.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Selects rows from a table.
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>>;

    /// Inserts rows into a table, returning them as stored.
    ///
    /// Missing `id`, `created_at`, and `updated_at` fields are filled
    /// in, mirroring the hosted service's column defaults.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Shallow-merges `patch` into every row matching `filters` and
    /// refreshes `updated_at`. Returns the affected row count.
    async fn update(&self, table: &str, patch: Value, filters: Vec<Filter>) -> Result<u64>;

    /// Deletes rows matching `filters`. Returns the deleted row count.
    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64>;

    /// Inserts the row, or replaces an existing row with the same `id`.
    async fn upsert(&self, table: &str, row: Value) -> Result<Value>;
}

/// Decodes rows into a typed collection.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

/// Decodes a single row.
pub fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T> {
    Ok(serde_json::from_value(row)?)
}

/// Returns true if the row matches every filter.
pub(crate) fn matches_filters(row: &Value, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|f| row.get(&f.column) == Some(&f.value))
}

/// Renders a filter value the way `payload->>col` renders it: strings
/// unquoted, everything else as its JSON text.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fills in `id` and timestamp defaults and rejects non-object rows.
pub(crate) fn normalize_row(row: Value) -> Result<Map<String, Value>> {
    let mut map = match row {
        Value::Object(map) => map,
        other => {
            return Err(BackendError::RecordStore(format!(
                "row must be a JSON object, got {other}"
            )));
        }
    };

    if !map.contains_key("id") {
        map.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }
    let now = Value::String(Utc::now().to_rfc3339());
    map.entry("created_at").or_insert_with(|| now.clone());
    map.entry("updated_at").or_insert(now);
    Ok(map)
}

/// Stitches embed-joins into the selected rows.
///
/// Issues one child select per (parent row, join); acceptable for the
/// access patterns the storefront uses (order history pages).
pub(crate) async fn apply_joins<S: RecordStore + ?Sized>(
    store: &S,
    rows: &mut [Value],
    joins: &[JoinSpec],
) -> Result<()> {
    for join in joins {
        for row in rows.iter_mut() {
            let parent_value = row.get(&join.parent_key).cloned().unwrap_or(Value::Null);
            let children = store
                .select(
                    &join.table,
                    SelectQuery::new().filter(Filter::eq(&join.foreign_key, parent_value)),
                )
                .await?;

            let embedded = if join.many {
                Value::Array(children)
            } else {
                children.into_iter().next().unwrap_or(Value::Null)
            };

            if let Some(map) = row.as_object_mut() {
                map.insert(join.field.clone(), embedded);
            }
        }
    }
    Ok(())
}
