//! Records kept in positioned lists, and the entity-access interface the
//! coordinator works against.
//!
//! [`Record`] is the row shape both bundled backends store. Hosts that keep
//! their own entity structs implement [`Positioned`] instead; the coordinator
//! only needs an id, a position and the values of the scope fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    coordinator::PositionError,
    schema::PositionedOptions,
    scope::ScopeKey,
    value::Value,
};

/// Opaque, immutable identifier of a record within its list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a new ID from any string-like input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generates a fresh random ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&RecordId> for RecordId {
    fn from(id: &RecordId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl PartialEq<&str> for RecordId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Access the coordinator needs to a positioned entity.
///
/// This is the seam between the ordering algorithm and whatever the host
/// stores: read the id, read or write the position, and read the current
/// value of a named scope field. `scope_value` returns `None` when the entity
/// has no such field at all, which is distinct from a `Value::Null` field.
pub trait Positioned {
    /// The entity's identifier.
    fn id(&self) -> &RecordId;

    /// The entity's position, or `None` before one has been assigned.
    fn position(&self) -> Option<i64>;

    /// Overwrite the entity's position.
    fn set_position(&mut self, position: i64);

    /// Current value of a scope field.
    fn scope_value(&self, field: &str) -> Option<Value>;
}

/// A row of a positioned list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier within the list
    pub id: RecordId,
    /// 1-based rank within the record's scope
    pub position: Option<i64>,
    /// Declared column values, keyed by column name
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a record with no position and no fields.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            position: None,
            fields: BTreeMap::new(),
        }
    }

    /// Returns a field value, treating absent fields as null.
    pub fn field(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }
}

impl Positioned for Record {
    fn id(&self) -> &RecordId {
        &self.id
    }

    fn position(&self) -> Option<i64> {
        self.position
    }

    fn set_position(&mut self, position: i64) {
        self.position = Some(position);
    }

    fn scope_value(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }
}

/// The scope key and position an entity held before a mutation.
///
/// Hosts capture a snapshot from the stored row before applying changes and
/// hand it back to the coordinator after the row is written, so removal can
/// find the sibling set the entity is leaving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The entity's identifier
    pub id: RecordId,
    /// Position before the mutation
    pub position: Option<i64>,
    /// Scope key before the mutation
    pub scope: ScopeKey,
}

impl Snapshot {
    /// Capture the scope key and position of an entity.
    pub fn capture<P: Positioned + ?Sized>(options: &PositionedOptions, entity: &P) -> Result<Self> {
        Ok(Self {
            id: entity.id().clone(),
            position: entity.position(),
            scope: ScopeKey::capture(options, entity)?,
        })
    }
}

/// Input for creating a record.
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    /// Explicit ID; generated when absent
    pub id: Option<RecordId>,
    /// Explicit starting position; appended to the scope when absent
    pub position: Option<i64>,
    /// Column values
    pub fields: BTreeMap<String, Value>,
}

impl NewRecord {
    /// Starts an empty record description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-chosen ID.
    pub fn id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Request an explicit starting position.
    pub fn position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    /// Set a column value.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// How an update treats the position column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionChange {
    /// Move to this position
    Set(i64),
    /// Move to the end of the (possibly new) scope
    Clear,
}

/// Changes applied to an existing record.
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    /// Position change, if any
    pub position: Option<PositionChange>,
    /// Column values to overwrite
    pub fields: BTreeMap<String, Value>,
}

impl RecordChanges {
    /// Starts an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the record to an explicit position.
    pub fn position(mut self, position: i64) -> Self {
        self.position = Some(PositionChange::Set(position));
        self
    }

    /// Clear the position so the record is placed last.
    pub fn clear_position(mut self) -> Self {
        self.position = Some(PositionChange::Clear);
        self
    }

    /// Overwrite a column value.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns true if nothing would change.
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.fields.is_empty()
    }

    /// Apply to a record in place.
    ///
    /// A cleared position leaves `record.position` as `None`; the caller is
    /// expected to run default position assignment before writing the row.
    pub(crate) fn apply(&self, record: &mut Record) -> std::result::Result<(), PositionError> {
        for (name, value) in &self.fields {
            record.fields.insert(name.clone(), value.clone());
        }
        match self.position {
            Some(PositionChange::Set(position)) if position < 1 => {
                return Err(PositionError::InvalidPosition { position });
            }
            Some(PositionChange::Set(position)) => record.position = Some(position),
            Some(PositionChange::Clear) => record.position = None,
            None => {}
        }
        Ok(())
    }
}
