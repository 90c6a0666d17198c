//! Scope resolution.
//!
//! A scope is the set of records sharing identical values in a list's scope
//! columns. [`ScopeKey`] is that tuple of values; [`ScopeFilter`] is the
//! predicate handed to the store for reads and bulk shifts. Resolution has no
//! side effects and can use either an entity's current values or the values it
//! held before a mutation, since closing a gap must find the scope the entity
//! is leaving.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    coordinator::PositionError,
    record::{Positioned, RecordId, Snapshot},
    schema::{ListSchema, PositionedOptions},
    value::Value,
};

/// Values of a list's scope columns, in scope order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(Vec<Value>);

impl ScopeKey {
    /// The key of an unscoped list.
    pub fn unscoped() -> Self {
        Self(Vec::new())
    }

    /// Builds a key from values in scope order.
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// Read the current scope values of an entity.
    pub fn capture<P: Positioned + ?Sized>(options: &PositionedOptions, entity: &P) -> Result<Self> {
        let mut values = Vec::with_capacity(options.scope.len());
        for field in &options.scope {
            let value = entity
                .scope_value(field)
                .ok_or_else(|| PositionError::UnknownScopeField {
                    list: String::new(),
                    field: field.clone(),
                })?;
            values.push(value);
        }
        Ok(Self(values))
    }

    /// The values, in scope order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the unscoped key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

/// Selects which values scope resolution reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSelector {
    /// Values as they are now
    Current,
    /// Values before the mutation being reconciled
    Previous,
}

/// Equality predicate identifying one scope of one list.
///
/// Null values match with `IS NULL` semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    list: String,
    conditions: Vec<(String, Value)>,
}

impl ScopeFilter {
    /// Build a filter from an explicit scope key.
    pub fn new(schema: &ListSchema, key: &ScopeKey) -> Result<Self> {
        let fields = schema.scope_fields();
        if fields.len() != key.len() {
            return Err(PositionError::ScopeArity {
                list: schema.name().to_string(),
                expected: fields.len(),
                actual: key.len(),
            }
            .into());
        }
        Ok(Self {
            list: schema.name().to_string(),
            conditions: fields.iter().cloned().zip(key.values().iter().cloned()).collect(),
        })
    }

    /// Resolve the scope of an entity.
    ///
    /// With [`ValueSelector::Previous`] the snapshot's scope is used; an
    /// entity without a snapshot (never persisted) has no previous values, so
    /// its current values stand in.
    pub fn resolve<P: Positioned + ?Sized>(
        schema: &ListSchema,
        entity: &P,
        previous: Option<&Snapshot>,
        selector: ValueSelector,
    ) -> Result<Self> {
        match (selector, previous) {
            (ValueSelector::Previous, Some(snapshot)) => Self::new(schema, &snapshot.scope),
            _ => {
                let key = ScopeKey::capture(schema.options(), entity).map_err(|e| {
                    match e {
                        crate::Error::Position(PositionError::UnknownScopeField { field, .. }) => {
                            PositionError::UnknownScopeField {
                                list: schema.name().to_string(),
                                field,
                            }
                            .into()
                        }
                        other => other,
                    }
                })?;
                Self::new(schema, &key)
            }
        }
    }

    /// The list this filter targets.
    pub fn list(&self) -> &str {
        &self.list
    }

    /// `(column, value)` equality conditions.
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// The scope key this filter matches.
    pub fn key(&self) -> ScopeKey {
        ScopeKey(self.conditions.iter().map(|(_, v)| v.clone()).collect())
    }

    /// Evaluate the predicate against a row's fields.
    pub fn matches(&self, fields: &BTreeMap<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(column, expected)| match fields.get(column) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            })
    }
}

/// Which positions a bulk shift touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionWindow {
    /// `position >= from`
    AtOrAfter(i64),
    /// `position BETWEEN low AND high`, inclusive
    Between(i64, i64),
}

impl PositionWindow {
    /// Returns true if `position` falls in the window.
    pub fn contains(&self, position: i64) -> bool {
        match *self {
            PositionWindow::AtOrAfter(from) => position >= from,
            PositionWindow::Between(low, high) => (low..=high).contains(&position),
        }
    }
}

/// A set-based position update: add `delta` to every row of the scope inside
/// `window`, except `exclude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionShift {
    /// Rows affected
    pub window: PositionWindow,
    /// Row left untouched (the entity being reconciled)
    pub exclude: Option<RecordId>,
    /// Amount added to each matching position
    pub delta: i64,
}

impl PositionShift {
    /// Returns true if a row with this id and position is shifted.
    pub fn applies_to(&self, id: &RecordId, position: i64) -> bool {
        self.exclude.as_ref() != Some(id) && self.window.contains(position)
    }
}
