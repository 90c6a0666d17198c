//! sqlx-backed store for positioned lists.
//!
//! Every registered list becomes its own table, `positioned_<list>`, with the
//! reserved `id` and `position` columns followed by the list's declared
//! columns, plus an index over `(scope..., position)`. A `positioned_lists`
//! registry table remembers each list's schema so that a later registration
//! under the same name can be checked against it.
//!
//! One [`BackendTxn`] wraps one `sqlx::Transaction`. Sibling shifts are single
//! `UPDATE ... WHERE` statements and report `rows_affected()`, which is the
//! count the coordinator compares against the expected range size.
//!
//! SQLite and PostgreSQL share the code through `AnyPool`; [`DbKind`] selects
//! the few dialect differences (ordering collation, upsert syntax).

mod storage;

/// Registry tables, versioning and per-list DDL.
pub mod schema;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "postgres")]
use std::time::Duration;

use async_trait::async_trait;
use sqlx::AnyPool;
#[cfg(feature = "postgres")]
use sqlx::Executor;
use sqlx::any::AnyPoolOptions;
use tokio::sync::RwLock;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{BackendImpl, BackendTxn};
use crate::schema::ListSchema;

/// Attaches a context message to sqlx failures.
pub(crate) trait SqlxResultExt<T> {
    /// Wrap the error as [`BackendError::SqlxError`].
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            BackendError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// SQL dialect of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// SQLite
    Sqlite,
    /// PostgreSQL
    Postgres,
}

/// Schemas registered through one backend, keyed by list name.
pub(crate) type ListRegistry = Arc<RwLock<HashMap<String, Arc<ListSchema>>>>;

#[cfg(feature = "sqlite")]
const SQLITE_FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;";

#[cfg(feature = "sqlite")]
const SQLITE_MEMORY_PRAGMAS: &str = "PRAGMA busy_timeout = 5000;";

/// Store backed by SQLite or PostgreSQL through sqlx.
///
/// Cloning the pool is cheap, but the list registry is per instance: a list
/// must be registered with [`BackendImpl::ensure_list`] on each backend that
/// opens a transaction against it.
pub struct SqlxBackend {
    pool: AnyPool,
    kind: DbKind,
    lists: ListRegistry,
}

impl std::fmt::Debug for SqlxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxBackend")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SqlxBackend {
    async fn from_pool(pool: AnyPool, kind: DbKind) -> Result<Self> {
        let backend = Self {
            pool,
            kind,
            lists: Arc::new(RwLock::new(HashMap::new())),
        };
        schema::initialize(&backend).await?;
        Ok(backend)
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// The connection's dialect.
    pub fn kind(&self) -> DbKind {
        self.kind
    }

    /// Names of the lists registered through this instance, sorted.
    pub async fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every pooled connection.
    ///
    /// Transactions opened afterwards fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(feature = "sqlite")]
impl SqlxBackend {
    /// Open (creating if needed) a SQLite database file.
    ///
    /// ```ignore
    /// let backend = SqlxBackend::open_sqlite("lists.db").await?;
    /// ```
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect_sqlite(&url).await
    }

    /// Connect to SQLite with a full connection URL.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        // Shared-cache memory databases vanish with their last connection
        let in_memory = url.contains("mode=memory");
        let mut options = AnyPoolOptions::new().max_connections(5);
        if in_memory {
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options
            .connect(url)
            .await
            .sql_context("Failed to connect to SQLite")?;

        let pragmas = if in_memory {
            SQLITE_MEMORY_PRAGMAS
        } else {
            SQLITE_FILE_PRAGMAS
        };
        sqlx::query(pragmas)
            .execute(&pool)
            .await
            .sql_context("Failed to configure SQLite")?;

        Self::from_pool(pool, DbKind::Sqlite).await
    }

    /// A private in-memory SQLite database that lives as long as the backend.
    pub async fn sqlite_in_memory() -> Result<Self> {
        let name = uuid::Uuid::new_v4();
        Self::connect_sqlite(&format!(
            "sqlite:file:positioned_{name}?mode=memory&cache=shared"
        ))
        .await
    }
}

#[cfg(feature = "postgres")]
impl SqlxBackend {
    /// Connect to PostgreSQL using the server's default search path.
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        Self::connect_postgres_in(url, None).await
    }

    /// Connect to PostgreSQL inside a fresh, uniquely named schema.
    ///
    /// Used by tests so that parallel runs never see each other's lists.
    pub async fn connect_postgres_isolated(url: &str) -> Result<Self> {
        let name = format!("positioned_{}", uuid::Uuid::new_v4().simple());
        Self::connect_postgres_in(url, Some(name)).await
    }

    async fn connect_postgres_in(url: &str, search_path: Option<String>) -> Result<Self> {
        sqlx::any::install_default_drivers();

        if let Some(schema) = &search_path {
            let setup = AnyPoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .sql_context("Failed to connect to PostgreSQL")?;
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
                .execute(&setup)
                .await
                .sql_context(&format!("Failed to create schema {schema}"))?;
            setup.close().await;
        }

        let options = match search_path {
            // Keep isolated pools small and patient; many run at once in tests
            Some(_) => AnyPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(30)),
            None => AnyPoolOptions::new().max_connections(5),
        };
        let pool = options
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    if let Some(schema) = search_path {
                        conn.execute(format!("SET search_path TO {schema}").as_str())
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;

        Self::from_pool(pool, DbKind::Postgres).await
    }
}

#[async_trait]
impl BackendImpl for SqlxBackend {
    async fn ensure_list(&self, list: &ListSchema) -> Result<()> {
        // Already registered through this instance: no round trip needed
        if let Some(known) = self.lists.read().await.get(list.name()) {
            return if known.as_ref() == list {
                Ok(())
            } else {
                Err(BackendError::SchemaMismatch {
                    list: list.name().to_string(),
                }
                .into())
            };
        }

        schema::register_list(self, list).await?;
        self.lists
            .write()
            .await
            .insert(list.name().to_string(), Arc::new(list.clone()));
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn BackendTxn>> {
        let tx = self
            .pool
            .begin()
            .await
            .sql_context("Failed to begin transaction")?;
        Ok(Box::new(storage::SqlxTxn::new(
            tx,
            self.kind,
            Arc::clone(&self.lists),
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// SQLite flavour of [`SqlxBackend`].
#[cfg(feature = "sqlite")]
pub type Sqlite = SqlxBackend;

/// PostgreSQL flavour of [`SqlxBackend`].
#[cfg(feature = "postgres")]
pub type Postgres = SqlxBackend;
