//! Store interface for positioned lists and its implementations.
//!
//! The coordinator never talks to a database directly. It needs a handful of
//! transactional primitives: read the maximum position of a scope, list a
//! scope in `(position, id)` order, shift positions in bulk and report how
//! many rows moved, and overwrite one row's position. [`BackendTxn`] defines
//! those, plus the row writes the host workflow performs in the same
//! transaction. [`BackendImpl`] opens transactions and registers lists.
//!
//! Implementations live under [`database`]: an in-memory store and, behind
//! the `sqlite` / `postgres` features, a sqlx-backed SQL store.

use std::any::Any;

use async_trait::async_trait;

use crate::{
    Result,
    record::{Record, RecordId},
    schema::ListSchema,
    scope::{PositionShift, ScopeFilter},
};

pub mod database;
pub mod errors;

pub use errors::BackendError;

/// A transactional store holding positioned lists.
///
/// All implementations must be `Send` and `Sync` to allow sharing across tasks,
/// and implement `Any` to allow for downcasting if needed.
#[async_trait]
pub trait BackendImpl: Send + Sync + Any {
    /// Register a list, creating its storage if needed.
    ///
    /// Registering the same schema again is a no-op. Registering a different
    /// schema under an existing name fails with
    /// [`BackendError::SchemaMismatch`].
    async fn ensure_list(&self, schema: &ListSchema) -> Result<()>;

    /// Start a transaction.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    async fn begin(&self) -> Result<Box<dyn BackendTxn>>;

    /// Returns a reference to the backend instance as a dynamic `Any` type.
    ///
    /// This allows for downcasting to a concrete backend implementation if necessary,
    /// enabling access to implementation-specific methods. Use with caution.
    fn as_any(&self) -> &dyn Any;
}

/// One open store transaction.
///
/// Every read observes the writes made earlier in the same transaction.
#[async_trait]
pub trait BackendTxn: Send {
    /// Fetch a record by ID.
    async fn get(&mut self, list: &str, id: &RecordId) -> Result<Option<Record>>;

    /// Insert a new record. Fails with [`BackendError::DuplicateRecord`] if
    /// the ID is taken.
    async fn insert(&mut self, list: &str, record: &Record) -> Result<()>;

    /// Overwrite an existing record's position and fields.
    async fn update(&mut self, list: &str, record: &Record) -> Result<()>;

    /// Delete a record, returning whether it existed.
    async fn delete(&mut self, list: &str, id: &RecordId) -> Result<bool>;

    /// All records of a scope ordered by `(position, id)`.
    async fn members(&mut self, filter: &ScopeFilter) -> Result<Vec<Record>>;

    /// `(id, position)` of every record of a scope ordered by `(position, id)`.
    async fn ordered_positions(&mut self, filter: &ScopeFilter) -> Result<Vec<(RecordId, i64)>>;

    /// Highest position in a scope, `None` when the scope is empty.
    async fn max_position(&mut self, filter: &ScopeFilter) -> Result<Option<i64>>;

    /// Apply a set-based position shift and return the number of rows changed.
    async fn shift_positions(&mut self, filter: &ScopeFilter, shift: &PositionShift) -> Result<u64>;

    /// Overwrite one row's position.
    async fn set_position(&mut self, list: &str, id: &RecordId, position: i64) -> Result<()>;

    /// Commit every write made in this transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write made in this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
