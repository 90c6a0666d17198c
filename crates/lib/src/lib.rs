//!
//! Positioned: dense, gap-free ordering for rows of a relational list.
//!
//! Each row of a list carries an integer `position`. Rows are partitioned into
//! independent orderings ("scopes") by the values of zero or more scope
//! columns. After every completed create, update or delete, the members of
//! each scope hold exactly the positions `1..=N`.
//!
//! ## Core Concepts
//!
//! * **Lists (`schema::ListSchema`)**: A named table with typed columns and the scope fields that partition it.
//! * **Records (`record::Record`)**: A row with an id, a position and column values. Hosts with their own entity types implement `record::Positioned` instead.
//! * **Scopes (`scope::ScopeKey`, `scope::ScopeFilter`)**: The tuple of scope values a record belongs to, and the predicate selecting its siblings.
//! * **Coordinator (`coordinator::Coordinator`)**: Assigns default positions and reconciles siblings after each write, inside the writer's transaction.
//! * **Backends (`backend::BackendImpl`)**: A pluggable transactional store. An in-memory store is always available; SQLite and PostgreSQL sit behind features.
//! * **Lists API (`list::PositionedList`)**: The host workflow wiring the above together: create, update, move, delete, each in one transaction.

pub mod backend;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod list;
pub mod record;
pub mod schema;
pub mod scope;
pub mod value;

pub use config::BackendConfig;
pub use coordinator::{Coordinator, Reconciliation};
pub use list::{PositionedList, ScopeHealth};
pub use record::{NewRecord, Positioned, Record, RecordChanges, RecordId, Snapshot};
pub use schema::{Column, ColumnType, ListSchema, PositionedOptions};
pub use scope::ScopeKey;
pub use value::Value;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured store errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),

    /// Structured registration and ordering errors from the coordinator module
    #[error(transparent)]
    Position(coordinator::PositionError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Backend(_) => "backend",
            Error::Position(_) => "coordinator",
        }
    }

    /// Check if this error indicates a record or list was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists, or a
    /// different schema registered under the same name).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error was raised while registering a list.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_configuration_error(),
            _ => false,
        }
    }

    /// Check if this error rejects host-supplied record data.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_validation_error(),
            _ => false,
        }
    }

    /// Check if this error is database/backend-related.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Check if this error indicates a data integrity issue.
    pub fn is_integrity_error(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_integrity_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_io_error(),
            _ => false,
        }
    }
}
