//! The position coordinator.
//!
//! Keeps the `position` column of a list dense within each scope: after every
//! completed create, update or delete, the members of a scope hold exactly the
//! positions `1..=N`. The coordinator is invoked by the host's own workflow at
//! three points, always inside the transaction that writes the entity's row:
//!
//! 1. [`Coordinator::assign_default_position`] before the row is written, when
//!    no explicit position was given (append to the end of the scope).
//! 2. [`Coordinator::reconcile`] after the row is written, which opens a gap,
//!    closes a gap, or shifts the range between the old and new position.
//! 3. [`Coordinator::remove`] after a row is deleted, which closes its gap.
//!
//! All sibling updates are set-based shifts issued through
//! [`BackendTxn::shift_positions`]. When a range shift moves a different number
//! of rows than the window predicts, the scope is not in the state the fast
//! path assumes (a concurrent writer, a duplicate, a gap), and the coordinator
//! falls back to [`Coordinator::renumber`], which rewrites the scope as
//! `1..=N` in `(position, id)` order. That fallback is the only repair path;
//! there is no retry loop.

pub mod errors;

use tracing::{debug, warn};

pub use errors::PositionError;

use crate::{
    Result,
    backend::BackendTxn,
    record::{Positioned, RecordId, Snapshot},
    schema::ListSchema,
    scope::{PositionShift, PositionWindow, ScopeFilter, ValueSelector},
};

/// Which reconciliation path ran for one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Neither scope nor position changed
    Noop,
    /// Joined a scope at a position; siblings at or after it moved up
    Inserted {
        /// Siblings shifted up
        shifted: u64,
    },
    /// Left one scope and joined another
    Moved {
        /// Siblings of the old scope shifted down
        closed: u64,
        /// Siblings of the new scope shifted up
        opened: u64,
    },
    /// Moved within one scope; siblings in between moved by one
    Shifted {
        /// Siblings shifted
        shifted: u64,
    },
    /// The range shift disagreed with the expected count and the scope was
    /// renumbered
    Renumbered {
        /// Members of the repaired scope
        members: usize,
    },
    /// Left a scope by deletion; siblings after it moved down
    Removed {
        /// Siblings shifted down
        shifted: u64,
    },
}

/// Position coordinator for one registered list.
///
/// The scope configuration is fixed at construction; a coordinator holds no
/// other state and can be shared freely.
#[derive(Debug, Clone)]
pub struct Coordinator {
    schema: ListSchema,
}

impl Coordinator {
    /// Create a coordinator for a validated list schema.
    pub fn new(schema: ListSchema) -> Self {
        Self { schema }
    }

    /// The list schema.
    pub fn schema(&self) -> &ListSchema {
        &self.schema
    }

    /// The list name.
    pub fn list(&self) -> &str {
        self.schema.name()
    }

    /// Resolve the scope an entity belongs to, now or before a mutation.
    pub fn scope_of<P: Positioned + ?Sized>(
        &self,
        entity: &P,
        previous: Option<&Snapshot>,
        selector: ValueSelector,
    ) -> Result<ScopeFilter> {
        ScopeFilter::resolve(&self.schema, entity, previous, selector)
    }

    /// Capture an entity's scope and position before mutating it.
    pub fn snapshot<P: Positioned + ?Sized>(&self, entity: &P) -> Result<Snapshot> {
        Snapshot::capture(self.schema.options(), entity).map_err(|e| match e {
            crate::Error::Position(PositionError::UnknownScopeField { field, .. }) => {
                PositionError::UnknownScopeField {
                    list: self.list().to_string(),
                    field,
                }
                .into()
            }
            other => other,
        })
    }

    /// Place an entity without a position at the end of its scope.
    ///
    /// Must run before the entity's row is written. For a new entity the
    /// position becomes `max + 1` (`1` in an empty scope). For an existing
    /// entity whose position was cleared it becomes the scope's current
    /// maximum when the scope is unchanged (the entity's own stored row counts
    /// toward that maximum) and `max + 1` when it is joining another scope.
    ///
    /// Returns the assigned position, or `None` if the entity already had one.
    pub async fn assign_default_position<P: Positioned + Send + ?Sized>(
        &self,
        txn: &mut dyn BackendTxn,
        entity: &mut P,
        previous: Option<&Snapshot>,
    ) -> Result<Option<i64>> {
        if entity.position().is_some() {
            return Ok(None);
        }

        let filter = self.scope_of(entity, previous, ValueSelector::Current)?;
        let max = txn.max_position(&filter).await?.unwrap_or(0);
        let position = match previous {
            Some(snapshot) if snapshot.scope == filter.key() => max.max(1),
            _ => max + 1,
        };
        entity.set_position(position);

        debug!(
            list = self.list(),
            id = %entity.id(),
            scope = %filter.key(),
            position,
            "Assigned default position"
        );
        Ok(Some(position))
    }

    /// Bring an explicit position into range before the row is written.
    ///
    /// Positions below 1 are rejected. Positions past the end of the scope
    /// are pulled back to the last slot: `max + 1` when the entity joins the
    /// scope, `max` when it already belongs to it.
    ///
    /// Returns the clamped position when it changed.
    pub async fn clamp_position<P: Positioned + Send + ?Sized>(
        &self,
        txn: &mut dyn BackendTxn,
        entity: &mut P,
        previous: Option<&Snapshot>,
    ) -> Result<Option<i64>> {
        let Some(requested) = entity.position() else {
            return Ok(None);
        };
        if requested < 1 {
            return Err(PositionError::InvalidPosition {
                position: requested,
            }
            .into());
        }

        let filter = self.scope_of(entity, previous, ValueSelector::Current)?;
        let max = txn.max_position(&filter).await?.unwrap_or(0);
        let joining = previous.is_none_or(|snapshot| snapshot.scope != filter.key());
        let limit = if joining { max + 1 } else { max.max(1) };
        if requested <= limit {
            return Ok(None);
        }

        entity.set_position(limit);
        debug!(
            list = self.list(),
            id = %entity.id(),
            requested,
            position = limit,
            "Clamped position to end of scope"
        );
        Ok(Some(limit))
    }

    /// Reconcile siblings after an entity's row was written.
    ///
    /// `previous` is the snapshot taken before the mutation, or `None` for a
    /// newly created entity. Exactly one path runs:
    ///
    /// - scope changed: close the gap in the old scope at the old position,
    ///   then open one in the new scope at the current position
    /// - same scope, new position: shift the range between the two
    /// - new entity: open a gap at its position
    /// - nothing changed: no-op
    pub async fn reconcile<P: Positioned + Sync + ?Sized>(
        &self,
        txn: &mut dyn BackendTxn,
        previous: Option<&Snapshot>,
        entity: &P,
    ) -> Result<Reconciliation> {
        let id = entity.id();
        let position = entity
            .position()
            .ok_or_else(|| PositionError::MissingPosition { id: id.to_string() })?;
        let current = self.scope_of(entity, previous, ValueSelector::Current)?;

        let Some(snapshot) = previous else {
            let shifted = self.insert_at(txn, &current, id, position).await?;
            return Ok(Reconciliation::Inserted { shifted });
        };

        if snapshot.scope != current.key() {
            let old = self.scope_of(entity, previous, ValueSelector::Previous)?;
            let closed = match snapshot.position {
                Some(vacated) => self.remove_from(txn, &old, id, vacated).await?,
                None => 0,
            };
            let opened = self.insert_at(txn, &current, id, position).await?;
            return Ok(Reconciliation::Moved { closed, opened });
        }

        match snapshot.position {
            Some(old) if old == position => Ok(Reconciliation::Noop),
            Some(old) => self.shift_range(txn, &current, id, old, position).await,
            None => {
                let shifted = self.insert_at(txn, &current, id, position).await?;
                Ok(Reconciliation::Inserted { shifted })
            }
        }
    }

    /// Close the gap left by a deleted entity.
    ///
    /// `snapshot` holds the scope and position the entity had when it was
    /// deleted.
    pub async fn remove(
        &self,
        txn: &mut dyn BackendTxn,
        snapshot: &Snapshot,
    ) -> Result<Reconciliation> {
        let Some(vacated) = snapshot.position else {
            return Ok(Reconciliation::Noop);
        };
        let filter = ScopeFilter::new(&self.schema, &snapshot.scope)?;
        let shifted = self.remove_from(txn, &filter, &snapshot.id, vacated).await?;
        Ok(Reconciliation::Removed { shifted })
    }

    /// Open a gap: every sibling at or after `target` moves up by one.
    pub async fn insert_at(
        &self,
        txn: &mut dyn BackendTxn,
        filter: &ScopeFilter,
        id: &RecordId,
        target: i64,
    ) -> Result<u64> {
        let shift = PositionShift {
            window: PositionWindow::AtOrAfter(target),
            exclude: Some(id.clone()),
            delta: 1,
        };
        let shifted = txn.shift_positions(filter, &shift).await?;
        debug!(list = filter.list(), scope = %filter.key(), %id, target, shifted, "Opened position");
        Ok(shifted)
    }

    /// Close a gap: every sibling at or after `vacated` moves down by one.
    pub async fn remove_from(
        &self,
        txn: &mut dyn BackendTxn,
        filter: &ScopeFilter,
        id: &RecordId,
        vacated: i64,
    ) -> Result<u64> {
        let shift = PositionShift {
            window: PositionWindow::AtOrAfter(vacated),
            exclude: Some(id.clone()),
            delta: -1,
        };
        let shifted = txn.shift_positions(filter, &shift).await?;
        debug!(list = filter.list(), scope = %filter.key(), %id, vacated, shifted, "Closed position");
        Ok(shifted)
    }

    /// Move within one scope from `old` to `new`.
    ///
    /// Siblings in `[min, max]` move one step toward the vacated slot. In a
    /// dense scope exactly `max - min` siblings match; any other count means
    /// the scope was already inconsistent, and it is renumbered instead.
    pub async fn shift_range(
        &self,
        txn: &mut dyn BackendTxn,
        filter: &ScopeFilter,
        id: &RecordId,
        old: i64,
        new: i64,
    ) -> Result<Reconciliation> {
        if old == new {
            return Ok(Reconciliation::Noop);
        }

        let direction = (old - new).signum();
        let (low, high) = if old < new { (old, new) } else { (new, old) };
        let shift = PositionShift {
            window: PositionWindow::Between(low, high),
            exclude: Some(id.clone()),
            delta: direction,
        };
        let shifted = txn.shift_positions(filter, &shift).await?;
        let expected = (high - low) as u64;

        if shifted != expected {
            warn!(
                list = filter.list(),
                scope = %filter.key(),
                %id,
                expected,
                shifted,
                "Position shift count mismatch; renumbering scope"
            );
            let members = self.renumber(txn, filter).await?;
            return Ok(Reconciliation::Renumbered { members });
        }

        debug!(list = filter.list(), scope = %filter.key(), %id, old, new, shifted, "Shifted positions");
        Ok(Reconciliation::Shifted { shifted })
    }

    /// Rewrite a scope as `1..=N` in `(position, id)` order.
    ///
    /// Correct on any input, including scopes with duplicate or missing
    /// positions, and deterministic for a given set of rows. Rows already at
    /// their target position are not written. Returns the member count.
    pub async fn renumber(&self, txn: &mut dyn BackendTxn, filter: &ScopeFilter) -> Result<usize> {
        let ordered = txn.ordered_positions(filter).await?;
        let mut rewritten = 0usize;
        for (index, (id, position)) in ordered.iter().enumerate() {
            let target = index as i64 + 1;
            if *position != target {
                txn.set_position(filter.list(), id, target).await?;
                rewritten += 1;
            }
        }

        tracing::info!(
            list = filter.list(),
            scope = %filter.key(),
            members = ordered.len(),
            rewritten,
            "Renumbered scope"
        );
        Ok(ordered.len())
    }
}
