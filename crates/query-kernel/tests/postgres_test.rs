#![allow(clippy::unwrap_used, clippy::expect_used)]
//! PostgreSQL integration tests.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a server the tests may
//! create schemas on. Each test works in its own schema and drops it at
//! the end.

mod common;

use std::sync::Arc;

use query_kernel::config::BuilderKind;
use query_kernel::storage::PgStorage;
use query_kernel::{
    Dialect, FilterRequest, ParameterizedStatement, QueryExecutor, RetryPolicy, SearchError,
    SearchService, SqlValue, Storage, Strategy,
};
use query_test_utils::{assert, scenario_customers};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use common::{BUILDERS, DEADLINE};

struct TestSchema {
    admin: PgPool,
    name: String,
    storage: PgStorage,
}

impl TestSchema {
    /// Create a private schema seeded with the scenario customers, or `None`
    /// when no test database is configured.
    async fn create() -> Option<Self> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        };

        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .expect("Failed to connect to test database");

        let name = format!("customer_search_{}", uuid::Uuid::now_v7().simple());
        sqlx::query(&format!("CREATE SCHEMA {name}"))
            .execute(&admin)
            .await
            .expect("Failed to create test schema");
        sqlx::query(&format!(
            "CREATE TABLE {name}.customers (
                customer_id INTEGER PRIMARY KEY,
                full_name TEXT NOT NULL,
                email_address TEXT,
                city TEXT
            )"
        ))
        .execute(&admin)
        .await
        .expect("Failed to create customers table");

        for customer in scenario_customers() {
            sqlx::query(&format!(
                "INSERT INTO {name}.customers (customer_id, full_name, email_address, city) \
                 VALUES ($1, $2, $3, $4)"
            ))
            .bind(customer.customer_id as i32)
            .bind(&customer.full_name)
            .bind(&customer.email_address)
            .bind(&customer.city)
            .execute(&admin)
            .await
            .expect("Failed to insert customer");
        }

        let search_path = format!("SET search_path TO {name}");
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    sqlx::query(&search_path).execute(conn).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .expect("Failed to open search pool");

        Some(Self {
            admin,
            name,
            storage: PgStorage::from_pool(pool),
        })
    }

    fn service(&self, builder: BuilderKind) -> SearchService {
        let storage: Arc<dyn Storage> = Arc::new(self.storage.clone());
        SearchService::new(
            QueryExecutor::new(storage, DEADLINE),
            builder.builder(Dialect::Postgres),
            RetryPolicy::none(),
        )
    }

    async fn drop_schema(self) {
        self.storage.close().await;
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.name))
            .execute(&self.admin)
            .await
            .expect("Failed to drop test schema");
        self.admin.close().await;
    }
}

#[tokio::test]
async fn name_search_on_postgres() {
    let Some(schema) = TestSchema::create().await else {
        return;
    };

    for builder in BUILDERS {
        let service = schema.service(builder);

        let rows = service.search_by_field("name", "ANA").await.unwrap();
        assert::names_eq(&rows.text_column("full_name"), &["Ana Silva", "Mariana"]);
        assert_eq!(rows.rows()[0].get("customer_id"), Some(&SqlValue::Integer(1)));

        let everyone = service.search_by_field("name", "").await.unwrap();
        assert_eq!(everyone.len(), 3);

        let literal = service.search_by_field("email", "_100%").await.unwrap();
        assert::names_eq(&literal.text_column("full_name"), &["Bruno"]);

        let wildcard = service.search_by_field("name", "an_").await.unwrap();
        assert!(wildcard.is_empty());

        let hostile = service
            .search_by_field("name", "'; DROP TABLE customers; --")
            .await
            .unwrap();
        assert!(hostile.is_empty());

        let invalid = service.search_by_field("ssn", "1").await;
        assert!(matches!(invalid, Err(SearchError::InvalidField { .. })));
    }

    let still_there = schema
        .service(BuilderKind::SeaQuery)
        .search(Vec::new(), Strategy::Builder)
        .await
        .unwrap();
    assert_eq!(still_there.len(), 3);

    schema.drop_schema().await;
}

#[tokio::test]
async fn equals_and_passthrough_on_postgres() {
    let Some(schema) = TestSchema::create().await else {
        return;
    };
    let service = schema.service(BuilderKind::SqlTemplate);

    let exact = service
        .search(
            vec![
                FilterRequest::equals("city", "Lisboa"),
                FilterRequest::contains("name", "bru"),
            ],
            Strategy::Builder,
        )
        .await
        .unwrap();
    assert::names_eq(&exact.text_column("full_name"), &["Bruno"]);

    let stmt = ParameterizedStatement::trusted(
        "SELECT full_name, city FROM customers WHERE city = $1 ORDER BY customer_id",
        vec!["Porto".into()],
        Dialect::Postgres,
    )
    .unwrap();
    let raw = service
        .search(Vec::new(), Strategy::RawPassthrough(stmt))
        .await
        .unwrap();
    assert::names_eq(&raw.text_column("full_name"), &["Ana Silva"]);
    assert_eq!(raw.rows()[0].columns(), &["full_name", "city"]);

    assert!(schema.storage.ping().await);

    schema.drop_schema().await;
}
