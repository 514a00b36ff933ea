//! PostgreSQL storage over a sqlx pool.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::{PoolSettings, Storage, StorageSession, Tabular};
use crate::error::StorageError;
use crate::row::SqlValue;
use crate::statement::Dialect;

/// PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Create a PostgreSQL connection pool.
    pub async fn connect(url: &str, settings: PoolSettings) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .context("failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for PgStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStorage").finish()
    }
}

#[async_trait]
impl Storage for PgStorage {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn acquire(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession { conn }))
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct PgSession {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl StorageSession for PgSession {
    async fn execute_parameterized(
        &mut self,
        template: &str,
        params: &[SqlValue],
    ) -> Result<Tabular, StorageError> {
        let query = bind_params(params, sqlx::query(template));
        let rows = query.fetch_all(&mut *self.conn).await?;
        rows_to_tabular(&rows)
    }

    fn discard(self: Box<Self>) {
        debug!("discarding PostgreSQL connection");
        drop(self.conn.detach());
    }
}

/// Bind kernel values to a sqlx query in order.
fn bind_params<'q>(
    params: &[SqlValue],
    mut query: Query<'q, Postgres, PgArguments>,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Bytes(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Map rows using the column metadata of the first row.
fn rows_to_tabular(rows: &[PgRow]) -> Result<Tabular, StorageError> {
    let Some(first) = rows.first() else {
        return Ok(Tabular::default());
    };
    let columns: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|index| decode_cell(row, index))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Tabular { columns, rows })
}

fn decode_cell(row: &PgRow, index: usize) -> Result<SqlValue, StorageError> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match row.column(index).type_info().name() {
        "BOOL" => SqlValue::Bool(row.try_get::<bool, _>(index)?),
        "INT2" => SqlValue::Integer(i64::from(row.try_get::<i16, _>(index)?)),
        "INT4" => SqlValue::Integer(i64::from(row.try_get::<i32, _>(index)?)),
        "INT8" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
        "FLOAT4" => SqlValue::Float(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => SqlValue::Float(row.try_get::<f64, _>(index)?),
        "BYTEA" => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(index)?),
        "UUID" => SqlValue::Text(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
        "JSON" | "JSONB" => SqlValue::Text(row.try_get::<serde_json::Value, _>(index)?.to_string()),
        "TIMESTAMPTZ" => SqlValue::Text(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
                .to_rfc3339(),
        ),
        "TIMESTAMP" => SqlValue::Text(row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string()),
        "DATE" => SqlValue::Text(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        // TEXT, VARCHAR, CHAR, NAME and everything else decodable as text
        _ => SqlValue::Text(row.try_get::<String, _>(index)?),
    };
    Ok(value)
}
