//! Statement execution against a storage collaborator.
//!
//! Each call checks out one session, runs the statement under a deadline,
//! and maps the tabular output into a [`ResultSet`]. The session is
//! released on every exit path and discarded when its connection can no
//! longer be trusted (timeout, connectivity fault).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::debug;

use crate::error::{ExecuteError, StorageError};
use crate::row::{ResultRow, ResultSet};
use crate::statement::ParameterizedStatement;
use crate::storage::{Storage, Tabular};

/// Runs parameterized statements. Never retries.
#[derive(Clone)]
pub struct QueryExecutor {
    storage: Arc<dyn Storage>,
    deadline: Duration,
}

impl QueryExecutor {
    pub fn new(storage: Arc<dyn Storage>, deadline: Duration) -> Self {
        Self { storage, deadline }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Execute one statement and collect its rows.
    pub async fn execute(&self, stmt: &ParameterizedStatement) -> Result<ResultSet, ExecuteError> {
        let storage_dialect = self.storage.dialect();
        if stmt.dialect() != storage_dialect {
            return Err(ExecuteError::DialectMismatch {
                statement: stmt.dialect(),
                storage: storage_dialect,
            });
        }

        let started = Instant::now();

        let mut session = match timeout(self.deadline, self.storage.acquire()).await {
            Ok(acquired) => acquired?,
            Err(_) => return Err(ExecuteError::Timeout(self.deadline)),
        };

        let remaining = self.deadline.saturating_sub(started.elapsed());
        let outcome = timeout(
            remaining,
            session.execute_parameterized(stmt.template(), stmt.params()),
        )
        .await;

        let tabular = match outcome {
            Ok(Ok(tabular)) => tabular,
            Ok(Err(err)) => {
                if err.is_unavailable() {
                    session.discard();
                }
                return Err(err.into());
            }
            Err(_) => {
                session.discard();
                return Err(ExecuteError::Timeout(self.deadline));
            }
        };
        drop(session);

        let result = into_result_set(tabular)?;

        debug!(
            params = stmt.params().len(),
            rows = result.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "statement executed"
        );

        Ok(result)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("dialect", &self.storage.dialect())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Share the column names across rows; reject ragged output.
fn into_result_set(tabular: Tabular) -> Result<ResultSet, StorageError> {
    let columns: Arc<[String]> = tabular.columns.into();
    let mut rows = Vec::with_capacity(tabular.rows.len());
    for values in tabular.rows {
        if values.len() != columns.len() {
            return Err(StorageError::Rejected(format!(
                "row has {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        rows.push(ResultRow::new(Arc::clone(&columns), values));
    }
    Ok(ResultSet::new(rows))
}
