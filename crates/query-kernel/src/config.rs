//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::search::RetryPolicy;
use crate::statement::{Dialect, SeaQueryStatementBuilder, SqlTemplateBuilder, StatementBuilder};

/// Which statement builder the builder strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BuilderKind {
    /// Declarative SeaQuery statements.
    SeaQuery,
    /// Hand-written SQL templates.
    SqlTemplate,
}

impl BuilderKind {
    pub fn builder(self, dialect: Dialect) -> Arc<dyn StatementBuilder> {
        match self {
            BuilderKind::SeaQuery => Arc::new(SeaQueryStatementBuilder::new(dialect)),
            BuilderKind::SqlTemplate => Arc::new(SqlTemplateBuilder::new(dialect)),
        }
    }
}

impl FromStr for BuilderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sea-query" | "sea_query" => Ok(BuilderKind::SeaQuery),
            "sql-template" | "sql_template" => Ok(BuilderKind::SqlTemplate),
            other => bail!("unknown statement builder '{other}'"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL: `postgres://...` or `sqlite:...`.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// How long to wait for a pooled connection (default: 3s).
    pub database_acquire_timeout: Duration,

    /// Deadline for one statement execution (default: 5s).
    pub statement_timeout: Duration,

    /// Statement builder for the builder strategy (default: sea-query).
    pub statement_builder: BuilderKind,

    /// Retry policy for transient failures (default: 3 attempts, 50ms backoff).
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let database_acquire_timeout = millis_var("DATABASE_ACQUIRE_TIMEOUT_MS", 3000)?;
        let statement_timeout = millis_var("SEARCH_STATEMENT_TIMEOUT_MS", 5000)?;

        let statement_builder = env::var("SEARCH_STATEMENT_BUILDER")
            .unwrap_or_else(|_| "sea-query".to_string())
            .parse()
            .context("SEARCH_STATEMENT_BUILDER must be sea-query or sql-template")?;

        let max_attempts = env::var("SEARCH_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("SEARCH_MAX_ATTEMPTS must be a valid u32")?;
        let base_backoff = millis_var("SEARCH_RETRY_BACKOFF_MS", 50)?;

        Ok(Self {
            database_url,
            database_max_connections,
            database_acquire_timeout,
            statement_timeout,
            statement_builder,
            retry: RetryPolicy {
                max_attempts,
                base_backoff,
            },
        })
    }

    /// Configuration with defaults for the given database URL.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            database_max_connections: 10,
            database_acquire_timeout: Duration::from_millis(3000),
            statement_timeout: Duration::from_millis(5000),
            statement_builder: BuilderKind::SeaQuery,
            retry: RetryPolicy::default(),
        }
    }
}

fn millis_var(name: &str, default: u64) -> Result<Duration> {
    parse_millis(name, env::var(name).ok().as_deref(), default)
}

fn parse_millis(name: &str, raw: Option<&str>, default: u64) -> Result<Duration> {
    let millis: u64 = match raw {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a number of milliseconds"))?,
        None => default,
    };
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_kind_parses() {
        assert_eq!(
            "sea-query".parse::<BuilderKind>().unwrap(),
            BuilderKind::SeaQuery
        );
        assert_eq!(
            " SQL_TEMPLATE ".parse::<BuilderKind>().unwrap(),
            BuilderKind::SqlTemplate
        );
        assert!("orm".parse::<BuilderKind>().is_err());
    }

    #[test]
    fn builder_kind_picks_implementation() {
        let builder = BuilderKind::SqlTemplate.builder(Dialect::Sqlite);
        assert_eq!(builder.name(), "sql-template");
        assert_eq!(builder.dialect(), Dialect::Sqlite);
        let builder = BuilderKind::SeaQuery.builder(Dialect::Postgres);
        assert_eq!(builder.name(), "sea-query");
    }

    #[test]
    fn millis_fall_back_to_default() {
        let timeout = parse_millis("SEARCH_STATEMENT_TIMEOUT_MS", None, 5000).unwrap();
        assert_eq!(timeout, Duration::from_secs(5));
        let timeout = parse_millis("SEARCH_STATEMENT_TIMEOUT_MS", Some(" 250 "), 5000).unwrap();
        assert_eq!(timeout, Duration::from_millis(250));
    }

    #[test]
    fn invalid_millis_name_the_variable() {
        for raw in ["5s", "-1", ""] {
            let err = parse_millis("DATABASE_ACQUIRE_TIMEOUT_MS", Some(raw), 3000).unwrap_err();
            assert!(
                err.to_string().contains("DATABASE_ACQUIRE_TIMEOUT_MS"),
                "{raw:?}: {err}"
            );
        }
    }

    #[test]
    fn defaults_for_database() {
        let config = Config::for_database("sqlite::memory:");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.statement_timeout, Duration::from_secs(5));
        assert_eq!(config.statement_builder, BuilderKind::SeaQuery);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
