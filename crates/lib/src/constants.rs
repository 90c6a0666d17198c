//! Constants used throughout the positioned library.
//!
//! This module provides central definitions for reserved column names, SQL
//! table naming and environment variables.

/// Column holding the record identifier.
pub const ID_COLUMN: &str = "id";

/// Column holding the record's rank within its scope.
pub const POSITION_COLUMN: &str = "position";

/// Prefix applied to list names to form SQL table names.
pub const TABLE_PREFIX: &str = "positioned_";

/// Table recording every registered list's schema.
pub const LISTS_TABLE: &str = "positioned_lists";

/// Table recording the layout version of the SQL bookkeeping tables.
pub const VERSION_TABLE: &str = "positioned_version";

/// Environment variable selecting the backend kind for [`BackendConfig::from_env`](crate::config::BackendConfig::from_env).
pub const BACKEND_ENV: &str = "POSITIONED_BACKEND";

/// Environment variable holding a database path or URL.
pub const DATABASE_URL_ENV: &str = "POSITIONED_DATABASE_URL";
