//! Bookkeeping tables and per-list DDL.
//!
//! The database holds two bookkeeping tables, `positioned_version` (one row,
//! the layout version of these tables) and `positioned_lists` (the JSON schema
//! of every registered list), plus one table per list created by
//! [`register_list`].
//!
//! A list named `tasks` with scope `project_id` becomes:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "positioned_tasks" (
//!     "id" TEXT PRIMARY KEY NOT NULL,
//!     "position" BIGINT NOT NULL,
//!     "project_id" BIGINT
//! );
//! CREATE INDEX IF NOT EXISTS "idx_positioned_tasks_scope"
//!     ON "positioned_tasks" ("project_id", "position");
//! ```
//!
//! `(scope, position)` carries no unique constraint; bulk
//! shifts pass through transient duplicates.

use crate::Result;
use crate::backend::errors::BackendError;
use crate::constants::{ID_COLUMN, LISTS_TABLE, POSITION_COLUMN, TABLE_PREFIX, VERSION_TABLE};
use crate::schema::{ColumnType, ListSchema};

use super::{SqlxBackend, SqlxResultExt};

/// Layout version of the bookkeeping tables.
pub const SCHEMA_VERSION: i64 = 1;

/// Bookkeeping DDL, portable across SQLite and PostgreSQL.
fn bookkeeping_statements() -> [String; 2] {
    [
        format!("CREATE TABLE IF NOT EXISTS {VERSION_TABLE} (version BIGINT PRIMARY KEY)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {LISTS_TABLE} (
                name TEXT PRIMARY KEY NOT NULL,
                schema_json TEXT NOT NULL
            )"
        ),
    ]
}

/// Create the bookkeeping tables and check their version.
///
/// A fresh database is stamped with [`SCHEMA_VERSION`]. A database stamped by
/// any other version is refused; there is no older layout to upgrade from.
pub async fn initialize(backend: &SqlxBackend) -> Result<()> {
    let pool = backend.pool();

    for statement in bookkeeping_statements() {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .map_err(|e| BackendError::SqlxError {
                reason: format!("Failed to create bookkeeping table: {e} - SQL: {statement}"),
                source: Some(e),
            })?;
    }

    let stamped: Option<(i64,)> = sqlx::query_as(&format!("SELECT version FROM {VERSION_TABLE}"))
        .fetch_optional(pool)
        .await
        .sql_context("Failed to read layout version")?;

    match stamped {
        None => {
            sqlx::query(&format!("INSERT INTO {VERSION_TABLE} (version) VALUES ($1)"))
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .sql_context("Failed to stamp layout version")?;
            tracing::info!(version = SCHEMA_VERSION, "Initialized positioned tables");
            Ok(())
        }
        Some((SCHEMA_VERSION,)) => Ok(()),
        Some((found,)) => Err(BackendError::InvalidConfig {
            reason: format!(
                "database layout version {found} is not supported (expected {SCHEMA_VERSION})"
            ),
        }
        .into()),
    }
}

/// Quote an identifier. Only used on validated list and column names.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

/// Quoted table name of a list.
pub(crate) fn table_name(list: &str) -> String {
    quote(&format!("{TABLE_PREFIX}{list}"))
}

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "BIGINT",
        ColumnType::Text => "TEXT",
    }
}

fn is_bookkeeping_table(list: &str) -> bool {
    let table = format!("{TABLE_PREFIX}{list}");
    table == LISTS_TABLE || table == VERSION_TABLE
}

/// DDL creating a list's table and its scope index.
pub fn list_table_statements(schema: &ListSchema) -> Vec<String> {
    let table = table_name(schema.name());

    let mut columns = vec![
        format!("{} TEXT PRIMARY KEY NOT NULL", quote(ID_COLUMN)),
        format!("{} BIGINT NOT NULL", quote(POSITION_COLUMN)),
    ];
    for column in schema.columns() {
        let null = if column.nullable { "" } else { " NOT NULL" };
        columns.push(format!(
            "{} {}{null}",
            quote(&column.name),
            sql_type(column.ty)
        ));
    }

    let mut indexed: Vec<String> = schema.scope_fields().iter().map(|f| quote(f)).collect();
    indexed.push(quote(POSITION_COLUMN));

    vec![
        format!("CREATE TABLE IF NOT EXISTS {table} ({})", columns.join(", ")),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
            quote(&format!("idx_{TABLE_PREFIX}{}_scope", schema.name())),
            indexed.join(", ")
        ),
    ]
}

/// Register a list, creating its table on first use.
///
/// The schema is stored as JSON in the registry table. Registering the same
/// schema again is a no-op; a different schema under the same name is
/// rejected with [`BackendError::SchemaMismatch`].
pub async fn register_list(backend: &SqlxBackend, schema: &ListSchema) -> Result<()> {
    schema.validate()?;
    if is_bookkeeping_table(schema.name()) {
        return Err(BackendError::InvalidConfig {
            reason: format!(
                "list name '{}' collides with a bookkeeping table",
                schema.name()
            ),
        }
        .into());
    }
    let schema_json = serde_json::to_string(schema)
        .map_err(|e| BackendError::SerializationFailed { source: e })?;

    let mut tx = backend
        .pool()
        .begin()
        .await
        .sql_context("Failed to begin transaction")?;

    let lookup = format!("SELECT schema_json FROM {LISTS_TABLE} WHERE name = $1");
    let existing: Option<(String,)> = sqlx::query_as(&lookup)
        .bind(schema.name())
        .fetch_optional(&mut *tx)
        .await
        .sql_context("Failed to look up list")?;

    match existing {
        Some((stored,)) => {
            let stored: ListSchema = serde_json::from_str(&stored)
                .map_err(|e| BackendError::DeserializationFailed { source: e })?;
            if stored != *schema {
                return Err(BackendError::SchemaMismatch {
                    list: schema.name().to_string(),
                }
                .into());
            }
        }
        None => {
            for statement in list_table_statements(schema) {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| BackendError::SqlxError {
                        reason: format!("List table creation failed: {e} - SQL: {statement}"),
                        source: Some(e),
                    })?;
            }

            let insert = format!(
                "INSERT INTO {LISTS_TABLE} (name, schema_json) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING"
            );
            sqlx::query(&insert)
                .bind(schema.name())
                .bind(schema_json)
                .execute(&mut *tx)
                .await
                .sql_context("Failed to register list")?;

            tracing::info!(list = schema.name(), "Created list table");
        }
    }

    tx.commit()
        .await
        .sql_context("Failed to commit transaction")?;
    Ok(())
}
