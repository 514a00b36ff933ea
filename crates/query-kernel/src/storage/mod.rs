//! Storage collaborators.
//!
//! A [`Storage`] hands out [`StorageSession`]s, each bound to one pooled
//! connection. Sessions execute templates with natively bound parameters and
//! return rows with their column metadata. Dropping a session releases the
//! connection back to the pool; [`StorageSession::discard`] closes it instead.

mod postgres;
mod sqlite;

pub use postgres::PgStorage;
pub use sqlite::SqliteStorage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::config::Config;
use crate::error::StorageError;
use crate::row::SqlValue;
use crate::statement::Dialect;

/// Raw tabular output of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tabular {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// One entry per row, aligned with `columns`.
    pub rows: Vec<Vec<SqlValue>>,
}

/// A storage backend reachable through parameter-binding execution.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Dialect statements must be rendered in.
    fn dialect(&self) -> Dialect;

    /// Check out a session bound to one connection.
    async fn acquire(&self) -> Result<Box<dyn StorageSession>, StorageError>;

    /// Check whether the backend answers a trivial query.
    async fn ping(&self) -> bool;

    /// Close all connections. Sessions acquired afterwards fail.
    async fn close(&self);
}

/// One checked-out connection.
#[async_trait]
pub trait StorageSession: Send {
    /// Execute `template` with `params` bound natively by the driver.
    async fn execute_parameterized(
        &mut self,
        template: &str,
        params: &[SqlValue],
    ) -> Result<Tabular, StorageError>;

    /// Close the connection instead of returning it to the pool.
    fn discard(self: Box<Self>);
}

/// Pool sizing shared by the backends.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl From<&Config> for PoolSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_connections: config.database_max_connections,
            acquire_timeout: config.database_acquire_timeout,
        }
    }
}

/// Open the backend named by the `DATABASE_URL` scheme.
pub async fn connect(config: &Config) -> Result<Arc<dyn Storage>> {
    let url = config.database_url.as_str();
    let settings = PoolSettings::from(config);

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Arc::new(PgStorage::connect(url, settings).await?))
    } else if url.starts_with("sqlite:") {
        Ok(Arc::new(SqliteStorage::connect(url, settings).await?))
    } else {
        bail!("unsupported DATABASE_URL scheme; expected postgres:// or sqlite:")
    }
}
