//! Error types for the search kernel.
//!
//! [`SearchError`] is what callers see. [`StorageError`] and
//! [`ExecuteError`] carry collaborator detail and stay inside the kernel;
//! the search service logs that detail and reduces it to a kind.

use std::time::Duration;

use thiserror::Error;

use crate::statement::Dialect;

/// Caller-visible search failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("unknown search field `{field}`")]
    InvalidField { field: String },

    #[error("statement rejected")]
    Statement,

    #[error("storage unavailable")]
    StorageUnavailable,

    #[error("search timed out")]
    Timeout,
}

impl SearchError {
    /// Transient failures that a read-only search may safely retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::StorageUnavailable | SearchError::Timeout)
    }
}

/// Failures reported by a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The collaborator could not be reached or lost the connection.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused or could not process the statement.
    #[error("statement rejected by storage: {0}")]
    Rejected(String),
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        let detail = err.to_string();
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::Unavailable(detail),
            // SQLSTATE class 08 is connection exception, 57P is operator
            // intervention (admin shutdown, crash shutdown, cannot connect now).
            sqlx::Error::Database(db_err)
                if db_err
                    .code()
                    .is_some_and(|code| code.starts_with("08") || code.starts_with("57P")) =>
            {
                StorageError::Unavailable(detail)
            }
            _ => StorageError::Rejected(detail),
        }
    }
}

/// Failures of a single statement execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("statement exceeded the {0:?} deadline")]
    Timeout(Duration),

    #[error("statement built for {statement:?} cannot run on {storage:?} storage")]
    DialectMismatch { statement: Dialect, storage: Dialect },
}

impl From<ExecuteError> for SearchError {
    fn from(err: ExecuteError) -> Self {
        match err {
            ExecuteError::Storage(StorageError::Unavailable(_)) => SearchError::StorageUnavailable,
            ExecuteError::Storage(StorageError::Rejected(_)) => SearchError::Statement,
            ExecuteError::Timeout(_) => SearchError::Timeout,
            ExecuteError::DialectMismatch { .. } => SearchError::Statement,
        }
    }
}
