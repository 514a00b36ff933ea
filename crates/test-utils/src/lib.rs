#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Customer search test utilities.
//!
//! Helpers for integration testing: customer fixtures, a seeded in-memory
//! SQLite storage, a scriptable fake storage for fault injection, and
//! assertion helpers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use query_kernel::storage::SqliteStorage;
use query_kernel::{Dialect, SqlValue, Storage, StorageError, StorageSession, Tabular};
use sqlx::sqlite::SqlitePoolOptions;

/// DDL for the customers table used by the SQLite fixtures.
pub const CREATE_CUSTOMERS: &str = r#"
    CREATE TABLE customers (
        customer_id INTEGER PRIMARY KEY,
        full_name TEXT NOT NULL,
        email_address TEXT,
        city TEXT
    )
"#;

/// Create a test customer with default contact details.
pub fn test_customer(customer_id: i64, full_name: &str) -> TestCustomer {
    let handle = full_name
        .split_whitespace()
        .next()
        .unwrap_or("customer")
        .to_lowercase();
    TestCustomer {
        customer_id,
        full_name: full_name.to_string(),
        email_address: Some(format!("{handle}@example.com")),
        city: Some("Lisboa".to_string()),
    }
}

/// The three customers of the name search scenarios, in key order.
pub fn scenario_customers() -> Vec<TestCustomer> {
    vec![
        test_customer(1, "Ana Silva").with_city("Porto"),
        test_customer(2, "Mariana"),
        test_customer(3, "Bruno").with_email("bruno_100%@example.com"),
    ]
}

/// A customer fixture.
#[derive(Debug, Clone)]
pub struct TestCustomer {
    pub customer_id: i64,
    pub full_name: String,
    pub email_address: Option<String>,
    pub city: Option<String>,
}

impl TestCustomer {
    /// Set the email address.
    pub fn with_email(mut self, email: &str) -> Self {
        self.email_address = Some(email.to_string());
        self
    }

    /// Set the city.
    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    /// Clear the city.
    pub fn without_city(mut self) -> Self {
        self.city = None;
        self
    }
}

/// Open an in-memory SQLite database holding `customers`.
///
/// The pool keeps exactly one connection alive for its whole lifetime,
/// since every new in-memory connection would start with an empty database.
pub async fn sqlite_storage(customers: &[TestCustomer]) -> SqliteStorage {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::query(CREATE_CUSTOMERS)
        .execute(&pool)
        .await
        .expect("Failed to create customers table");

    for customer in customers {
        sqlx::query(
            "INSERT INTO customers (customer_id, full_name, email_address, city) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(customer.customer_id)
        .bind(&customer.full_name)
        .bind(&customer.email_address)
        .bind(&customer.city)
        .execute(&pool)
        .await
        .expect("Failed to insert customer");
    }

    SqliteStorage::from_pool(pool)
}

/// What a [`FakeStorage`] does for one acquired session.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Return these rows.
    Rows(Tabular),
    /// Fail while checking out a session.
    FailAcquire(StorageError),
    /// Fail while executing, after the session was checked out.
    FailExecute(StorageError),
    /// Sleep this long, then return no rows.
    Hang(Duration),
}

#[derive(Debug)]
struct FakeState {
    dialect: Dialect,
    script: Mutex<VecDeque<FakeBehavior>>,
    fallback: Mutex<FakeBehavior>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    discarded: AtomicUsize,
    executed: Mutex<Vec<(String, Vec<SqlValue>)>>,
}

/// Scriptable storage. Each acquire consumes the next scripted behavior,
/// falling back to a fixed behavior once the script is empty.
#[derive(Debug, Clone)]
pub struct FakeStorage {
    state: Arc<FakeState>,
}

impl FakeStorage {
    /// Fake storage that falls back to `fallback` once the script is empty.
    pub fn new(dialect: Dialect, fallback: FakeBehavior) -> Self {
        Self {
            state: Arc::new(FakeState {
                dialect,
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(fallback),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
                executed: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fake storage returning `rows` for every statement.
    pub fn with_rows(dialect: Dialect, rows: Tabular) -> Self {
        Self::new(dialect, FakeBehavior::Rows(rows))
    }

    /// Queue a behavior ahead of the fallback.
    pub fn then(self, behavior: FakeBehavior) -> Self {
        self.state.script.lock().push_back(behavior);
        self
    }

    /// Sessions checked out so far.
    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    /// Sessions returned to the pool.
    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    /// Sessions closed instead of returned.
    pub fn discarded(&self) -> usize {
        self.state.discarded.load(Ordering::SeqCst)
    }

    /// Templates and parameters received, in order.
    pub fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.state.executed.lock().clone()
    }

    fn next_behavior(&self) -> FakeBehavior {
        let scripted = self.state.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.state.fallback.lock().clone())
    }
}

#[async_trait]
impl Storage for FakeStorage {
    fn dialect(&self) -> Dialect {
        self.state.dialect
    }

    async fn acquire(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        let behavior = self.next_behavior();
        if let FakeBehavior::FailAcquire(err) = behavior {
            return Err(err);
        }
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            behavior,
            discarded: false,
        }))
    }

    async fn ping(&self) -> bool {
        !matches!(
            *self.state.fallback.lock(),
            FakeBehavior::FailAcquire(_)
        )
    }

    async fn close(&self) {}
}

struct FakeSession {
    state: Arc<FakeState>,
    behavior: FakeBehavior,
    discarded: bool,
}

#[async_trait]
impl StorageSession for FakeSession {
    async fn execute_parameterized(
        &mut self,
        template: &str,
        params: &[SqlValue],
    ) -> Result<Tabular, StorageError> {
        self.state
            .executed
            .lock()
            .push((template.to_string(), params.to_vec()));

        match &self.behavior {
            FakeBehavior::Rows(rows) => Ok(rows.clone()),
            FakeBehavior::FailExecute(err) | FakeBehavior::FailAcquire(err) => Err(err.clone()),
            FakeBehavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Tabular::default())
            }
        }
    }

    fn discard(mut self: Box<Self>) {
        self.discarded = true;
        self.state.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.discarded {
            self.state.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Build a [`Tabular`] from string cells; `None` becomes NULL.
pub fn tabular(columns: &[&str], rows: &[&[Option<&str>]]) -> Tabular {
    Tabular {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|cell| SqlValue::from(*cell)).collect())
            .collect(),
    }
}

/// Assertion helpers for statements and results.
pub mod assert {
    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{}'\nActual: {}",
            needle,
            haystack
        );
    }

    /// Assert that two name lists are equal, order included.
    pub fn names_eq(actual: &[&str], expected: &[&str]) {
        assert_eq!(
            actual, expected,
            "name mismatch:\nactual: {actual:?}\nexpected: {expected:?}"
        );
    }
}
