use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{BackendError, Result};
use crate::record::{
    Filter, RecordOp, RecordStore, SelectQuery, apply_joins, matches_filters, normalize_row,
};

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Value>>,
    fail_on: HashSet<(RecordOp, String)>,
}

/// In-memory record store implementation for testing.
///
/// Provides the same interface as the PostgreSQL implementation, plus
/// seeding helpers and per-(operation, table) fault injection.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a table with rows, filling in id/timestamp defaults.
    pub async fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut state = self.state.write().await;
        let entries = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Ok(map) = normalize_row(row) {
                entries.push(Value::Object(map));
            }
        }
    }

    /// Returns a snapshot of a table's rows.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .read()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of rows in a table.
    pub async fn row_count(&self, table: &str) -> usize {
        self.state
            .read()
            .await
            .tables
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    /// Configures the store to fail calls of `op` against `table`.
    pub async fn set_fail_on(&self, op: RecordOp, table: &str, fail: bool) {
        let mut state = self.state.write().await;
        let key = (op, table.to_string());
        if fail {
            state.fail_on.insert(key);
        } else {
            state.fail_on.remove(&key);
        }
    }

    /// Removes all rows and fault toggles.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.tables.clear();
        state.fail_on.clear();
    }

    async fn check_fail(&self, op: RecordOp, table: &str) -> Result<()> {
        let state = self.state.read().await;
        if state.fail_on.contains(&(op, table.to_string())) {
            return Err(BackendError::RecordStore(format!(
                "injected {op:?} failure for table '{table}'"
            )));
        }
        Ok(())
    }
}

fn compare_columns(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => {
            let x = a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string());
            let y = b.as_str().map(str::to_string).unwrap_or_else(|| b.to_string());
            x.cmp(&y)
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>> {
        self.check_fail(RecordOp::Select, table).await?;

        let mut rows: Vec<Value> = {
            let state = self.state.read().await;
            state
                .tables
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| matches_filters(row, &query.filters))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if let Some(order) = &query.order_by {
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).cloned().unwrap_or(Value::Null);
                let right = b.get(&order.column).cloned().unwrap_or(Value::Null);
                let ord = compare_columns(&left, &right);
                if order.ascending { ord } else { ord.reverse() }
            });
        }

        apply_joins(self, &mut rows, &query.joins).await?;
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        self.check_fail(RecordOp::Insert, table).await?;

        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            inserted.push(Value::Object(normalize_row(row)?));
        }

        let mut state = self.state.write().await;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(inserted.clone());
        Ok(inserted)
    }

    async fn update(&self, table: &str, patch: Value, filters: Vec<Filter>) -> Result<u64> {
        self.check_fail(RecordOp::Update, table).await?;

        let patch = match patch {
            Value::Object(map) => map,
            other => {
                return Err(BackendError::RecordStore(format!(
                    "patch must be a JSON object, got {other}"
                )));
            }
        };

        let mut state = self.state.write().await;
        let mut affected = 0;
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut() {
                if matches_filters(row, &filters)
                    && let Some(map) = row.as_object_mut()
                {
                    for (key, value) in &patch {
                        map.insert(key.clone(), value.clone());
                    }
                    map.insert(
                        "updated_at".to_string(),
                        Value::String(Utc::now().to_rfc3339()),
                    );
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64> {
        self.check_fail(RecordOp::Delete, table).await?;

        let mut state = self.state.write().await;
        let mut removed = 0;
        if let Some(rows) = state.tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|row| !matches_filters(row, &filters));
            removed = (before - rows.len()) as u64;
        }
        Ok(removed)
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<Value> {
        self.check_fail(RecordOp::Upsert, table).await?;

        let map = normalize_row(row)?;
        let id = map.get("id").cloned().unwrap_or(Value::Null);
        let stored = Value::Object(map);

        let mut state = self.state.write().await;
        let rows = state.tables.entry(table.to_string()).or_default();
        if let Some(existing) = rows.iter_mut().find(|r| r.get("id") == Some(&id)) {
            *existing = stored.clone();
        } else {
            rows.push(stored.clone());
        }
        Ok(stored)
    }
}
