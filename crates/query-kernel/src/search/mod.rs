//! Customer search service.
//!
//! Entry point for callers. Validates filters, picks the execution strategy,
//! runs the statement through the [`QueryExecutor`] and reduces failures to
//! a [`SearchError`] kind. Storage detail is logged here and never returned.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::SearchError;
use crate::executor::QueryExecutor;
use crate::row::ResultSet;
use crate::statement::{FilterRequest, ParameterizedStatement, StatementBuilder};
use crate::storage::Storage;

/// How a search reaches the executor.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Compile the filters with the service's statement builder.
    Builder,
    /// Run a statement prepared by trusted code. Its template is static text
    /// and its values are already bound; request filters are not applied.
    RawPassthrough(ParameterizedStatement),
}

/// Retry policy for transient failures. Searches are read-only, so
/// re-running them is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each retry.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Run once, never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

/// Search façade. Cheap to clone; holds no per-call state.
#[derive(Clone)]
pub struct SearchService {
    executor: QueryExecutor,
    builder: Arc<dyn StatementBuilder>,
    retry: RetryPolicy,
}

impl SearchService {
    pub fn new(
        executor: QueryExecutor,
        builder: Arc<dyn StatementBuilder>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            executor,
            builder,
            retry,
        }
    }

    /// Wire a service from configuration onto an open storage handle.
    pub fn from_config(storage: Arc<dyn Storage>, config: &Config) -> Self {
        let builder = config.statement_builder.builder(storage.dialect());
        let executor = QueryExecutor::new(storage, config.statement_timeout);
        Self::new(executor, builder, config.retry)
    }

    /// Run a search.
    ///
    /// With [`Strategy::Builder`], every filter field is checked against the
    /// allow-list, filters with blank values are dropped, and the rest are
    /// combined with AND. No remaining filters means every customer.
    pub async fn search(
        &self,
        filters: Vec<FilterRequest>,
        strategy: Strategy,
    ) -> Result<ResultSet, SearchError> {
        let stmt = match strategy {
            Strategy::Builder => {
                for filter in &filters {
                    if let Err(err) = filter.search_field() {
                        debug!(field = %filter.field, "rejected unknown search field");
                        return Err(err);
                    }
                }
                let active: Vec<FilterRequest> =
                    filters.into_iter().filter(|f| !f.is_blank()).collect();
                self.builder.build(&active)?
            }
            Strategy::RawPassthrough(stmt) => {
                if !filters.is_empty() {
                    warn!(
                        ignored = filters.len(),
                        "filters are not applied to passthrough statements"
                    );
                }
                stmt
            }
        };

        self.execute_with_retry(&stmt).await
    }

    /// Customers whose `field` contains `value`, ignoring case.
    pub async fn search_by_field(&self, field: &str, value: &str) -> Result<ResultSet, SearchError> {
        self.search(vec![FilterRequest::contains(field, value)], Strategy::Builder)
            .await
    }

    pub fn builder_name(&self) -> &'static str {
        self.builder.name()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn execute_with_retry(
        &self,
        stmt: &ParameterizedStatement,
    ) -> Result<ResultSet, SearchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.base_backoff;
        let mut attempt = 1;

        loop {
            match self.executor.execute(stmt).await {
                Ok(rows) => return Ok(rows),
                Err(err) => {
                    warn!(error = %err, attempt, max_attempts, "search execution failed");
                    let kind = SearchError::from(err);
                    if !kind.is_retryable() || attempt >= max_attempts {
                        return Err(kind);
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("builder", &self.builder.name())
            .field("executor", &self.executor)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_backoff, Duration::from_millis(50));
    }

    #[test]
    fn no_retry_policy_runs_once() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_backoff, Duration::ZERO);
    }
}
