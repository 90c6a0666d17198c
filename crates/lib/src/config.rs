//! Backend selection.
//!
//! [`BackendConfig`] names a backend and where its data lives. It can be
//! deserialized from a host's own configuration file (the `kind` field selects
//! the variant) or read from the environment with [`BackendConfig::from_env`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    backend::{BackendImpl, errors::BackendError},
    constants::{BACKEND_ENV, DATABASE_URL_ENV},
};

/// Which backend to open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Volatile in-memory store
    #[default]
    InMemory,
    /// In-memory store loaded from, and saved to, a JSON file by the host
    InMemoryFile {
        /// Path of the JSON file
        path: PathBuf,
    },
    /// SQLite database file
    Sqlite {
        /// Path of the database file
        path: PathBuf,
    },
    /// Private in-memory SQLite database
    SqliteInMemory,
    /// PostgreSQL database
    Postgres {
        /// Connection URL
        url: String,
    },
}

impl BackendConfig {
    /// Read the backend from `POSITIONED_BACKEND` and `POSITIONED_DATABASE_URL`.
    ///
    /// Recognized kinds are `inmemory` (the default when unset), `inmemory_file`,
    /// `sqlite`, `sqlite_memory` and `postgres`. Every kind but `inmemory` and
    /// `sqlite_memory` needs the path or URL variable.
    pub fn from_env() -> Result<Self> {
        let kind = std::env::var(BACKEND_ENV).unwrap_or_default();
        let location = std::env::var(DATABASE_URL_ENV).ok();
        Self::from_parts(&kind, location)
    }

    fn from_parts(kind: &str, location: Option<String>) -> Result<Self> {
        let require = |what: &str| -> Result<String> {
            location.clone().ok_or_else(|| {
                BackendError::InvalidConfig {
                    reason: format!("backend '{what}' requires {DATABASE_URL_ENV}"),
                }
                .into()
            })
        };

        match kind.to_ascii_lowercase().as_str() {
            "" | "inmemory" | "in_memory" => Ok(Self::InMemory),
            "inmemory_file" | "in_memory_file" => Ok(Self::InMemoryFile {
                path: require(kind)?.into(),
            }),
            "sqlite" => Ok(Self::Sqlite {
                path: require(kind)?.into(),
            }),
            "sqlite_memory" | "sqlite_in_memory" => Ok(Self::SqliteInMemory),
            "postgres" | "postgresql" => Ok(Self::Postgres {
                url: require(kind)?,
            }),
            other => Err(BackendError::InvalidConfig {
                reason: format!("unknown backend kind '{other}' in {BACKEND_ENV}"),
            }
            .into()),
        }
    }

    /// Open the configured backend.
    ///
    /// SQL variants fail with [`BackendError::InvalidConfig`] when the crate
    /// was built without the matching feature.
    pub async fn connect(&self) -> Result<Arc<dyn BackendImpl>> {
        tracing::debug!(config = ?self, "Opening backend");
        match self {
            Self::InMemory => Ok(Arc::new(crate::backend::database::InMemory::new())),
            Self::InMemoryFile { path } => Ok(Arc::new(
                crate::backend::database::InMemory::load_from_file(path).await?,
            )),
            #[cfg(feature = "sqlite")]
            Self::Sqlite { path } => Ok(Arc::new(
                crate::backend::database::SqlxBackend::open_sqlite(path).await?,
            )),
            #[cfg(feature = "sqlite")]
            Self::SqliteInMemory => Ok(Arc::new(
                crate::backend::database::SqlxBackend::sqlite_in_memory().await?,
            )),
            #[cfg(feature = "postgres")]
            Self::Postgres { url } => Ok(Arc::new(
                crate::backend::database::SqlxBackend::connect_postgres(url).await?,
            )),
            #[allow(unreachable_patterns)]
            other => Err(BackendError::InvalidConfig {
                reason: format!("backend {other:?} is not enabled in this build"),
            }
            .into()),
        }
    }
}
