//! List registration: columns, scope fields, and validation.
//!
//! A list is registered once with a [`ListSchema`]. Building the schema checks
//! that every scope field names a declared column, so a misconfigured scope
//! fails when the list is defined rather than when the first row moves.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    constants::{ID_COLUMN, POSITION_COLUMN},
    coordinator::PositionError,
    value::Value,
};

/// Which columns partition a list into independently ordered scopes.
///
/// An empty scope means the whole list is one sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionedOptions {
    /// Scope columns, in key order
    #[serde(default)]
    pub scope: Vec<String>,
}

impl PositionedOptions {
    /// Unscoped options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options scoped by the given columns.
    pub fn scoped_by<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a scope column.
    pub fn scope(mut self, field: impl Into<String>) -> Self {
        self.scope.push(field.into());
        self
    }

    /// Returns true if the whole list is one scope.
    pub fn is_unscoped(&self) -> bool {
        self.scope.is_empty()
    }
}

/// Storage type of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit integer
    Integer,
    /// UTF-8 text
    Text,
}

impl ColumnType {
    /// Name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Text => "text",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null) | (ColumnType::Integer, Value::Integer(_)) | (ColumnType::Text, Value::Text(_))
        )
    }
}

/// A declared column of a list, in addition to `id` and `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Storage type
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Whether null is allowed
    #[serde(default)]
    pub nullable: bool,
}

impl Column {
    /// A non-nullable integer column.
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ColumnType::Integer,
            nullable: false,
        }
    }

    /// A non-nullable text column.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ColumnType::Text,
            nullable: false,
        }
    }

    /// Allow null values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Definition of a positioned list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSchema {
    name: String,
    columns: Vec<Column>,
    options: PositionedOptions,
}

impl ListSchema {
    /// Starts a builder for a list.
    pub fn builder(name: impl Into<String>) -> ListSchemaBuilder {
        ListSchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
            options: PositionedOptions::default(),
        }
    }

    /// Validate a fully described schema.
    ///
    /// Used for schemas that arrive deserialized rather than via the builder.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;

        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_name(&column.name)?;
            if column.name == ID_COLUMN || column.name == POSITION_COLUMN {
                return Err(PositionError::ReservedColumn {
                    column: column.name.clone(),
                }
                .into());
            }
            if !seen.insert(column.name.as_str()) {
                return Err(PositionError::DuplicateColumn {
                    list: self.name.clone(),
                    column: column.name.clone(),
                }
                .into());
            }
        }

        let mut scoped = HashSet::new();
        for field in &self.options.scope {
            if !seen.contains(field.as_str()) {
                return Err(PositionError::UnknownScopeField {
                    list: self.name.clone(),
                    field: field.clone(),
                }
                .into());
            }
            if !scoped.insert(field.as_str()) {
                return Err(PositionError::DuplicateScopeField {
                    list: self.name.clone(),
                    field: field.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// The list name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns, excluding `id` and `position`.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a declared column.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Scope configuration.
    pub fn options(&self) -> &PositionedOptions {
        &self.options
    }

    /// Scope columns, in key order.
    pub fn scope_fields(&self) -> &[String] {
        &self.options.scope
    }

    /// Check a record's fields against the declared columns.
    ///
    /// Missing nullable columns are filled with null. Unknown fields, missing
    /// non-nullable columns and type mismatches are rejected.
    pub fn normalize_fields(&self, fields: &mut BTreeMap<String, Value>) -> Result<()> {
        if let Some(unknown) = fields.keys().find(|name| self.column(name).is_none()) {
            return Err(PositionError::UnknownField {
                list: self.name.clone(),
                field: unknown.clone(),
            }
            .into());
        }

        for column in &self.columns {
            let value = fields.entry(column.name.clone()).or_default();
            if !column.ty.accepts(value) {
                return Err(PositionError::TypeMismatch {
                    field: column.name.clone(),
                    expected: column.ty.name(),
                    actual: value.type_name(),
                }
                .into());
            }
            if value.is_null() && !column.nullable {
                return Err(PositionError::MissingField {
                    list: self.name.clone(),
                    field: column.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Builder for [`ListSchema`].
#[derive(Debug, Clone)]
pub struct ListSchemaBuilder {
    name: String,
    columns: Vec<Column>,
    options: PositionedOptions,
}

impl ListSchemaBuilder {
    /// Declare a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a scope field.
    pub fn scope(mut self, field: impl Into<String>) -> Self {
        self.options = self.options.scope(field);
        self
    }

    /// Replace the scope configuration.
    pub fn options(mut self, options: PositionedOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate and build the schema.
    pub fn build(self) -> Result<ListSchema> {
        let schema = ListSchema {
            name: self.name,
            columns: self.columns,
            options: self.options,
        };
        schema.validate()?;
        Ok(schema)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PositionError::InvalidName {
            name: name.to_string(),
        }
        .into())
    }
}
