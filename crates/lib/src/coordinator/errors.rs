//! Error types for list registration and position coordination.
//!
//! Registration problems (a scope naming a column that does not exist, an
//! invalid identifier) are programming errors and surface when a
//! [`ListSchema`](crate::schema::ListSchema) is built, never per row. The
//! remaining variants reject malformed host input before anything is written.

use thiserror::Error;

/// Errors raised by schema registration and the position coordinator.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PositionError {
    /// A scope field does not name a declared column.
    #[error("Scope field '{field}' is not a column of list '{list}'")]
    UnknownScopeField {
        /// The list being registered
        list: String,
        /// The offending scope field
        field: String,
    },

    /// The same scope field was listed twice.
    #[error("Scope field '{field}' is listed more than once for list '{list}'")]
    DuplicateScopeField {
        /// The list being registered
        list: String,
        /// The repeated field
        field: String,
    },

    /// A column was declared twice.
    #[error("Column '{column}' is declared more than once for list '{list}'")]
    DuplicateColumn {
        /// The list being registered
        list: String,
        /// The repeated column
        column: String,
    },

    /// A declared column collides with a column the coordinator owns.
    #[error("Column '{column}' is reserved")]
    ReservedColumn {
        /// The reserved column name
        column: String,
    },

    /// A list or column name is not a plain identifier.
    #[error("Invalid name '{name}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidName {
        /// The rejected name
        name: String,
    },

    /// A record carries a field the list does not declare.
    #[error("Field '{field}' is not a column of list '{list}'")]
    UnknownField {
        /// The list
        list: String,
        /// The unknown field
        field: String,
    },

    /// A non-nullable column was left empty.
    #[error("Field '{field}' of list '{list}' may not be null")]
    MissingField {
        /// The list
        list: String,
        /// The missing field
        field: String,
    },

    /// A field value does not match its column type.
    #[error("Field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        /// The field
        field: String,
        /// Expected column type
        expected: &'static str,
        /// Type of the supplied value
        actual: &'static str,
    },

    /// A scope key does not have one value per scope field.
    #[error("Scope key has {actual} values but list '{list}' is scoped by {expected} fields")]
    ScopeArity {
        /// The list
        list: String,
        /// Number of scope fields
        expected: usize,
        /// Number of values supplied
        actual: usize,
    },

    /// Explicit positions are 1-based.
    #[error("Invalid position {position}: positions start at 1")]
    InvalidPosition {
        /// The rejected position
        position: i64,
    },

    /// A persisted record was reconciled without a position.
    #[error("Record {id} has no position")]
    MissingPosition {
        /// The record id
        id: String,
    },
}

impl PositionError {
    /// Check if this error was raised while registering a list.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PositionError::UnknownScopeField { .. }
                | PositionError::DuplicateScopeField { .. }
                | PositionError::DuplicateColumn { .. }
                | PositionError::ReservedColumn { .. }
                | PositionError::InvalidName { .. }
        )
    }

    /// Check if this error rejects host-supplied record data.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            PositionError::UnknownField { .. }
                | PositionError::MissingField { .. }
                | PositionError::TypeMismatch { .. }
                | PositionError::ScopeArity { .. }
                | PositionError::InvalidPosition { .. }
                | PositionError::MissingPosition { .. }
        )
    }
}

impl From<PositionError> for crate::Error {
    fn from(err: PositionError) -> Self {
        crate::Error::Position(err)
    }
}
