//! Concrete stores.
//!
//! [`InMemory`] is always compiled. [`SqlxBackend`] (aliased as `Sqlite` and
//! `Postgres`) needs the matching cargo feature.

mod in_memory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use in_memory::InMemory;
#[cfg(feature = "postgres")]
pub use sql::Postgres;
#[cfg(feature = "sqlite")]
pub use sql::Sqlite;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::{DbKind, SqlxBackend};
