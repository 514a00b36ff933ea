#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Services here run on the real kernel code: a seeded in-memory SQLite
//! database for end-to-end searches, and a scripted fake storage where a
//! test needs faults, hangs or session accounting.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use query_kernel::config::BuilderKind;
use query_kernel::{Dialect, QueryExecutor, RetryPolicy, SearchService, Storage};
use query_test_utils::{FakeStorage, TestCustomer, scenario_customers, sqlite_storage};

/// Builders exercised by the end-to-end tests.
pub const BUILDERS: [BuilderKind; 2] = [BuilderKind::SeaQuery, BuilderKind::SqlTemplate];

/// Deadline used unless a test is about timeouts.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Search service over SQLite seeded with Ana Silva, Mariana and Bruno.
pub async fn scenario_service(builder: BuilderKind) -> SearchService {
    seeded_service(builder, &scenario_customers()).await
}

/// Search service over SQLite seeded with `customers`.
pub async fn seeded_service(builder: BuilderKind, customers: &[TestCustomer]) -> SearchService {
    let storage: Arc<dyn Storage> = Arc::new(sqlite_storage(customers).await);
    let executor = QueryExecutor::new(storage, DEADLINE);
    SearchService::new(
        executor,
        builder.builder(Dialect::Sqlite),
        RetryPolicy::none(),
    )
}

/// Search service over a fake storage.
pub fn fake_service(fake: &FakeStorage, deadline: Duration, retry: RetryPolicy) -> SearchService {
    let storage: Arc<dyn Storage> = Arc::new(fake.clone());
    let executor = QueryExecutor::new(storage, deadline);
    SearchService::new(
        executor,
        BuilderKind::SeaQuery.builder(fake.dialect()),
        retry,
    )
}

/// Retry quickly; tests should not wait on backoff.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_backoff: Duration::from_millis(1),
    }
}
