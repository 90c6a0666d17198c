//! Store error types for positioned list backends.
//!
//! This module defines structured error types for store operations,
//! providing better error context and type safety compared to string-based errors.

use crate::record::RecordId;
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Store failures are fatal to the lifecycle operation that hit them: the
/// surrounding transaction is rolled back and the error reaches the caller
/// unchanged.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Field additions/changes require a major version bump
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Record not found by ID.
    #[error("Record not found in list '{list}': {id}")]
    RecordNotFound {
        /// The list that was searched
        list: String,
        /// The ID of the record that was not found
        id: RecordId,
    },

    /// A record with this ID already exists.
    #[error("Record already exists in list '{list}': {id}")]
    DuplicateRecord {
        /// The list
        list: String,
        /// The conflicting ID
        id: RecordId,
    },

    /// The list has not been registered with this backend.
    #[error("Unknown list: {list}")]
    UnknownList {
        /// The list name
        list: String,
    },

    /// A list was registered again with a different definition.
    #[error("List '{list}' is already registered with a different schema")]
    SchemaMismatch {
        /// The list name
        list: String,
    },

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// File I/O error.
    #[error("File I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A stored row could not be decoded.
    #[error("Corrupt row in list '{list}': {reason}")]
    CorruptRow {
        /// The list
        list: String,
        /// What was wrong with the row
        reason: String,
    },

    /// Backend configuration could not be used.
    #[error("Invalid backend configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem
        reason: String,
    },

    /// SQL database error.
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("SQL error: {reason}")]
    SqlxError {
        /// Description including context
        reason: String,
        /// The underlying sqlx error, when there is one
        #[source]
        source: Option<sqlx::Error>,
    },
}

impl BackendError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackendError::RecordNotFound { .. } | BackendError::UnknownList { .. }
        )
    }

    /// Check if this error indicates a conflict with existing data.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            BackendError::DuplicateRecord { .. } | BackendError::SchemaMismatch { .. }
        )
    }

    /// Check if this error indicates a data integrity issue.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, BackendError::CorruptRow { .. })
    }

    /// Check if this error is related to I/O operations.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BackendError::FileIo { .. }
                | BackendError::SerializationFailed { .. }
                | BackendError::DeserializationFailed { .. }
        )
    }

    /// Get the record ID if this error is about a specific record.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            BackendError::RecordNotFound { id, .. } | BackendError::DuplicateRecord { id, .. } => {
                Some(id)
            }
            _ => None,
        }
    }

    /// Get the list name if this error is about a specific list.
    pub fn list(&self) -> Option<&str> {
        match self {
            BackendError::RecordNotFound { list, .. }
            | BackendError::DuplicateRecord { list, .. }
            | BackendError::UnknownList { list }
            | BackendError::SchemaMismatch { list }
            | BackendError::CorruptRow { list, .. } => Some(list),
            _ => None,
        }
    }
}

// Conversion from BackendError to the main Error type
impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
