use std::sync::Arc;

use positioned::{
    Column, ListSchema, NewRecord, PositionedList, Record, RecordId, ScopeKey,
    backend::{BackendImpl, database::InMemory},
};

// ==========================
// CORE TEST FACTORIES
// ==========================
// Single point of change for backend matrix testing via TEST_BACKEND env var.

/// Creates a test backend based on TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory backend (default)
/// - "sqlite": SQLite in-memory backend (requires `sqlite` feature)
/// - "postgres": PostgreSQL backend (requires `postgres` feature and TEST_POSTGRES_URL)
///
/// # Panics
/// Panics if TEST_BACKEND=sqlite but the `sqlite` feature is not enabled.
/// Panics if TEST_BACKEND=postgres but the `postgres` feature is not enabled.
///
/// # Example
/// ```bash
/// # Run tests with InMemory (default)
/// cargo test
///
/// # Run tests with SQLite
/// TEST_BACKEND=sqlite cargo test --features sqlite
///
/// # Run tests with PostgreSQL
/// TEST_BACKEND=postgres TEST_POSTGRES_URL="postgres://localhost/positioned_test" \
///   cargo test --features postgres
/// ```
pub async fn test_backend() -> Arc<dyn BackendImpl> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use positioned::backend::database::Sqlite;
                Arc::new(
                    Sqlite::sqlite_in_memory()
                        .await
                        .expect("Failed to create SQLite backend"),
                )
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("postgres") => {
            #[cfg(feature = "postgres")]
            {
                use positioned::backend::database::Postgres;
                let url = std::env::var("TEST_POSTGRES_URL")
                    .unwrap_or_else(|_| "postgres://localhost/positioned_test".to_string());
                Arc::new(
                    Postgres::connect_postgres_isolated(&url)
                        .await
                        .expect("Failed to connect to PostgreSQL"),
                )
            }
            #[cfg(not(feature = "postgres"))]
            {
                panic!("TEST_BACKEND=postgres requires the 'postgres' feature to be enabled")
            }
        }
        Ok("inmemory") | Ok("") | Err(_) => Arc::new(InMemory::new()),
        Ok(other) => {
            panic!("Unknown TEST_BACKEND value: {other}. Supported: inmemory, sqlite, postgres")
        }
    }
}

// ==========================
// LIST SCHEMAS
// ==========================

/// Tasks ordered per project.
pub fn tasks_schema() -> ListSchema {
    ListSchema::builder("tasks")
        .column(Column::text("title"))
        .column(Column::integer("project_id"))
        .scope("project_id")
        .build()
        .expect("Failed to build tasks schema")
}

/// Custom fields ordered per (type, project); global fields have a null project.
pub fn custom_fields_schema() -> ListSchema {
    ListSchema::builder("custom_fields")
        .column(Column::text("type"))
        .column(Column::integer("project_id").nullable())
        .scope("type")
        .scope("project_id")
        .build()
        .expect("Failed to build custom_fields schema")
}

/// A single global ordering.
pub fn tags_schema() -> ListSchema {
    ListSchema::builder("tags")
        .column(Column::text("name"))
        .build()
        .expect("Failed to build tags schema")
}

/// Opens a list on a fresh test backend.
pub async fn open_list(schema: ListSchema) -> PositionedList {
    PositionedList::open(test_backend().await, schema)
        .await
        .expect("Failed to open list")
}

pub fn project(id: i64) -> ScopeKey {
    ScopeKey::new([id])
}

pub fn rid(id: &str) -> RecordId {
    RecordId::from(id)
}

/// Appends tasks with the given ids to a project, in order.
pub async fn seed_tasks(list: &PositionedList, project_id: i64, ids: &[&str]) {
    for id in ids {
        list.create(
            NewRecord::new()
                .id(*id)
                .field("title", format!("task {id}"))
                .field("project_id", project_id),
        )
        .await
        .expect("Failed to create task");
    }
}

/// `(id, position)` of every member, in order.
pub async fn positions(list: &PositionedList, scope: &ScopeKey) -> Vec<(String, i64)> {
    list.members(scope)
        .await
        .expect("Failed to list members")
        .into_iter()
        .map(|record: Record| {
            let position = record.position.expect("Stored record without position");
            (record.id.to_string(), position)
        })
        .collect()
}

/// Builds the expected `(id, position)` list from ids in order.
pub fn ranked(ids: &[&str]) -> Vec<(String, i64)> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| (id.to_string(), i as i64 + 1))
        .collect()
}

/// Asserts the scope holds exactly `1..=N`.
pub async fn assert_dense(list: &PositionedList, scope: &ScopeKey) {
    let health = list.check_scope(scope).await.expect("Failed to check scope");
    assert!(health.is_dense(), "scope {scope} is not dense: {health:?}");
}

/// Overwrites one row's position directly, bypassing the coordinator.
pub async fn corrupt_position(list: &PositionedList, id: &str, position: i64) {
    let mut txn = list.backend().begin().await.expect("Failed to begin");
    txn.set_position(list.name(), &rid(id), position)
        .await
        .expect("Failed to set position");
    txn.commit().await.expect("Failed to commit");
}
