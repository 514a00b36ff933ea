//! Customer search kernel library.
//!
//! Builds parameterized statements from filter requests, executes them
//! against a storage collaborator and maps the rows. The `customer-search`
//! binary is a thin host around [`search::SearchService`].

pub mod config;
pub mod error;
pub mod executor;
pub mod fields;
pub mod row;
pub mod search;
pub mod statement;
pub mod storage;

pub use config::Config;
pub use error::{ExecuteError, SearchError, StorageError};
pub use executor::QueryExecutor;
pub use row::{ResultRow, ResultSet, SqlValue};
pub use search::{RetryPolicy, SearchService, Strategy};
pub use statement::{
    Dialect, FilterOperator, FilterRequest, ParameterizedStatement, SeaQueryStatementBuilder,
    SqlTemplateBuilder, StatementBuilder,
};
pub use storage::{Storage, StorageSession, Tabular};
