//! SQLite storage over a sqlx pool, used for local runs and tests.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tracing::debug;

use super::{PoolSettings, Storage, StorageSession, Tabular};
use crate::error::StorageError;
use crate::row::SqlValue;
use crate::statement::Dialect;

/// SQLite connection pool.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(url: &str, settings: PoolSettings) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .context("failed to open SQLite database")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish()
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn acquire(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(SqliteSession { conn }))
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl StorageSession for SqliteSession {
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
        debug!("discarding SQLite connection");
        drop(self.conn.detach());
    }
}

fn bind_params<'q>(
    params: &[SqlValue],
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
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

fn rows_to_tabular(rows: &[SqliteRow]) -> Result<Tabular, StorageError> {
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

/// Decode by the value's storage class, which SQLite tracks per cell.
fn decode_cell(row: &SqliteRow, index: usize) -> Result<SqlValue, StorageError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match raw.type_info().name() {
        "INTEGER" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
        "REAL" => SqlValue::Float(row.try_get::<f64, _>(index)?),
        "BLOB" => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(index)?),
        _ => SqlValue::Text(row.try_get::<String, _>(index)?),
    };
    Ok(value)
}
