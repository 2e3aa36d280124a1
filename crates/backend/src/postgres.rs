//! PostgreSQL-backed record store implementation.
//!
//! The deployable stand-in for the hosted record store. Logical tables
//! share one physical table keyed by `(table_name, id)` with the row
//! body in a jsonb payload column; filters and ordering operate on
//! `payload->>` projections.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::config::BackendConfig;
use crate::error::{BackendError, Result};
use crate::record::{
    Filter, RecordStore, SelectQuery, apply_joins, normalize_row, value_text,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS store_records (
    table_name TEXT NOT NULL,
    id TEXT NOT NULL,
    payload JSONB NOT NULL,
    PRIMARY KEY (table_name, id)
)
"#;

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a record store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the configured `DATABASE_URL` and ensures the
    /// backing schema exists.
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let pool = PgPool::connect(&config.database_url).await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the backing table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("record store schema ensured");
        Ok(())
    }

    fn row_id(map: &serde_json::Map<String, Value>) -> Result<String> {
        map.get("id")
            .map(value_text)
            .ok_or_else(|| BackendError::RecordStore("row has no id".to_string()))
    }
}

/// Escapes a column name for use inside a `payload->>'…'` projection.
fn escape_column(column: &str) -> String {
    column.replace('\'', "''")
}

fn filter_clause(filters: &[Filter], first_placeholder: usize) -> String {
    let mut sql = String::new();
    for (i, filter) in filters.iter().enumerate() {
        sql.push_str(&format!(
            " AND payload->>'{}' = ${}",
            escape_column(&filter.column),
            first_placeholder + i
        ));
    }
    sql
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[tracing::instrument(skip(self, query), fields(filters = query.filters.len()))]
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>> {
        let mut sql =
            "SELECT payload FROM store_records WHERE table_name = $1".to_string();
        sql.push_str(&filter_clause(&query.filters, 2));
        if let Some(order) = &query.order_by {
            sql.push_str(&format!(
                " ORDER BY payload->>'{}' {}",
                escape_column(&order.column),
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }

        let mut q = sqlx::query(&sql).bind(table);
        for filter in &query.filters {
            q = q.bind(value_text(&filter.value));
        }

        let db_rows = q.fetch_all(&self.pool).await?;
        let mut rows = Vec::with_capacity(db_rows.len());
        for db_row in db_rows {
            rows.push(db_row.try_get::<Value, _>("payload")?);
        }

        apply_joins(self, &mut rows, &query.joins).await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut inserted = Vec::with_capacity(rows.len());
        let mut tx = self.pool.begin().await?;
        for row in rows {
            let map = normalize_row(row)?;
            let id = Self::row_id(&map)?;
            let payload = Value::Object(map);
            sqlx::query(
                "INSERT INTO store_records (table_name, id, payload) VALUES ($1, $2, $3)",
            )
            .bind(table)
            .bind(&id)
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
            inserted.push(payload);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    #[tracing::instrument(skip(self, patch, filters))]
    async fn update(&self, table: &str, patch: Value, filters: Vec<Filter>) -> Result<u64> {
        let mut patch_map = match patch {
            Value::Object(map) => map,
            other => {
                return Err(BackendError::RecordStore(format!(
                    "patch must be a JSON object, got {other}"
                )));
            }
        };
        patch_map.insert(
            "updated_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );

        let mut sql =
            "UPDATE store_records SET payload = payload || $2 WHERE table_name = $1".to_string();
        sql.push_str(&filter_clause(&filters, 3));

        let mut q = sqlx::query(&sql)
            .bind(table)
            .bind(Value::Object(patch_map));
        for filter in &filters {
            q = q.bind(value_text(&filter.value));
        }

        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, filters))]
    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64> {
        let mut sql = "DELETE FROM store_records WHERE table_name = $1".to_string();
        sql.push_str(&filter_clause(&filters, 2));

        let mut q = sqlx::query(&sql).bind(table);
        for filter in &filters {
            q = q.bind(value_text(&filter.value));
        }

        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, row))]
    async fn upsert(&self, table: &str, row: Value) -> Result<Value> {
        let map = normalize_row(row)?;
        let id = Self::row_id(&map)?;
        let payload = Value::Object(map);

        sqlx::query(
            r#"
            INSERT INTO store_records (table_name, id, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (table_name, id) DO UPDATE SET payload = EXCLUDED.payload
            "#,
        )
        .bind(table)
        .bind(&id)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_clause_placeholders() {
        let filters = vec![Filter::eq("user_id", "u1"), Filter::eq("status", "paid")];
        let clause = filter_clause(&filters, 2);
        assert_eq!(
            clause,
            " AND payload->>'user_id' = $2 AND payload->>'status' = $3"
        );
    }

    #[test]
    fn test_escape_column() {
        assert_eq!(escape_column("name"), "name");
        assert_eq!(escape_column("na'me"), "na''me");
    }
}
