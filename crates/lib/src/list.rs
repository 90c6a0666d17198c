//! Host workflow over one registered list.
//!
//! [`PositionedList`] is the create/update/delete path a host runs for its
//! rows. Every operation opens one backend transaction, writes the row, runs
//! the coordinator hooks at their defined points, and commits. Any error rolls
//! the whole transaction back, so the row write and its sibling shifts land
//! together or not at all.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    Result,
    backend::{BackendImpl, BackendTxn, errors::BackendError},
    coordinator::{Coordinator, Reconciliation},
    record::{NewRecord, PositionChange, Record, RecordChanges, RecordId, Snapshot},
    schema::ListSchema,
    scope::{ScopeFilter, ScopeKey},
};

/// Position health of one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeHealth {
    /// Number of records in the scope
    pub members: usize,
    /// Positions held by more than one record
    pub duplicates: Vec<i64>,
    /// Positions in `1..=members` held by no record
    pub gaps: Vec<i64>,
}

impl ScopeHealth {
    /// Returns true if the scope holds exactly `1..=members`.
    pub fn is_dense(&self) -> bool {
        self.duplicates.is_empty() && self.gaps.is_empty()
    }

    fn from_positions(positions: &[i64]) -> Self {
        let members = positions.len();
        let mut duplicates = Vec::new();
        for pair in positions.windows(2) {
            if pair[0] == pair[1] && duplicates.last() != Some(&pair[0]) {
                duplicates.push(pair[0]);
            }
        }
        let gaps = (1..=members as i64)
            .filter(|slot| positions.binary_search(slot).is_err())
            .collect();
        Self {
            members,
            duplicates,
            gaps,
        }
    }
}

/// A handle over one registered list on a shared backend.
#[derive(Clone)]
pub struct PositionedList {
    backend: Arc<dyn BackendImpl>,
    coordinator: Coordinator,
}

impl std::fmt::Debug for PositionedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionedList")
            .field("list", &self.name())
            .finish_non_exhaustive()
    }
}

impl PositionedList {
    /// Register `schema` on `backend` and return a handle to it.
    pub async fn open(backend: Arc<dyn BackendImpl>, schema: ListSchema) -> Result<Self> {
        backend.ensure_list(&schema).await?;
        Ok(Self {
            backend,
            coordinator: Coordinator::new(schema),
        })
    }

    /// The list name.
    pub fn name(&self) -> &str {
        self.coordinator.list()
    }

    /// The list schema.
    pub fn schema(&self) -> &ListSchema {
        self.coordinator.schema()
    }

    /// The coordinator for this list.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// The backend this list lives on.
    pub fn backend(&self) -> &Arc<dyn BackendImpl> {
        &self.backend
    }

    /// Insert a record.
    ///
    /// Without an explicit position the record is appended to its scope.
    /// An explicit position shifts the siblings at or after it up by one;
    /// positions past the end are clamped to `N + 1`.
    pub async fn create(&self, new: NewRecord) -> Result<Record> {
        let mut txn = self.backend.begin().await?;
        let result = self.create_in(txn.as_mut(), new).await;
        finish(txn, result).await
    }

    /// Apply changes to an existing record.
    ///
    /// Changing a scope field moves the record to the other scope, closing
    /// its gap in the old one. Clearing the position moves it to the end.
    pub async fn update(&self, id: &RecordId, changes: RecordChanges) -> Result<Record> {
        let mut txn = self.backend.begin().await?;
        let result = self.update_in(txn.as_mut(), id, changes).await;
        finish(txn, result).await
    }

    /// Move a record to another position in its scope.
    pub async fn move_to(&self, id: &RecordId, position: i64) -> Result<Record> {
        self.update(id, RecordChanges::new().position(position)).await
    }

    /// Move a record into another scope, at `position` or at the end.
    pub async fn move_to_scope(
        &self,
        id: &RecordId,
        scope: &ScopeKey,
        position: Option<i64>,
    ) -> Result<Record> {
        let filter = ScopeFilter::new(self.schema(), scope)?;
        let mut changes = RecordChanges::new();
        for (field, value) in filter.conditions() {
            changes = changes.field(field.clone(), value.clone());
        }
        changes.position = Some(match position {
            Some(position) => PositionChange::Set(position),
            None => PositionChange::Clear,
        });
        self.update(id, changes).await
    }

    /// Delete a record and close its gap. Returns the deleted record.
    pub async fn delete(&self, id: &RecordId) -> Result<Record> {
        let mut txn = self.backend.begin().await?;
        let result = self.delete_in(txn.as_mut(), id).await;
        finish(txn, result).await
    }

    /// Fetch a record by ID.
    pub async fn get(&self, id: &RecordId) -> Result<Option<Record>> {
        let mut txn = self.backend.begin().await?;
        let result = txn.get(self.name(), id).await;
        finish(txn, result).await
    }

    /// All records of a scope ordered by `(position, id)`.
    pub async fn members(&self, scope: &ScopeKey) -> Result<Vec<Record>> {
        let filter = ScopeFilter::new(self.schema(), scope)?;
        let mut txn = self.backend.begin().await?;
        let result = txn.members(&filter).await;
        finish(txn, result).await
    }

    /// Rewrite a scope as `1..=N`.
    pub async fn renumber(&self, scope: &ScopeKey) -> Result<Reconciliation> {
        let filter = ScopeFilter::new(self.schema(), scope)?;
        let mut txn = self.backend.begin().await?;
        let result = self
            .coordinator
            .renumber(txn.as_mut(), &filter)
            .await
            .map(|members| Reconciliation::Renumbered { members });
        finish(txn, result).await
    }

    /// Report duplicates and gaps in a scope.
    pub async fn check_scope(&self, scope: &ScopeKey) -> Result<ScopeHealth> {
        let filter = ScopeFilter::new(self.schema(), scope)?;
        let mut txn = self.backend.begin().await?;
        let result = txn.ordered_positions(&filter).await;
        let ordered = finish(txn, result).await?;
        let positions: Vec<i64> = ordered.into_iter().map(|(_, position)| position).collect();
        Ok(ScopeHealth::from_positions(&positions))
    }

    async fn create_in(&self, txn: &mut dyn BackendTxn, new: NewRecord) -> Result<Record> {
        let NewRecord {
            id,
            position,
            mut fields,
        } = new;
        self.schema().normalize_fields(&mut fields)?;
        let mut record = Record {
            id: id.unwrap_or_else(RecordId::generate),
            position,
            fields,
        };

        self.place(txn, &mut record, None).await?;
        txn.insert(self.name(), &record).await?;
        let reconciliation = self.coordinator.reconcile(txn, None, &record).await?;

        debug!(list = self.name(), id = %record.id, position = ?record.position, ?reconciliation, "Created record");
        Ok(record)
    }

    async fn update_in(
        &self,
        txn: &mut dyn BackendTxn,
        id: &RecordId,
        changes: RecordChanges,
    ) -> Result<Record> {
        let mut record = self.load(txn, id).await?;
        let previous = self.coordinator.snapshot(&record)?;

        changes.apply(&mut record)?;
        self.schema().normalize_fields(&mut record.fields)?;
        self.place(txn, &mut record, Some(&previous)).await?;

        txn.update(self.name(), &record).await?;
        let reconciliation = self
            .coordinator
            .reconcile(txn, Some(&previous), &record)
            .await?;

        debug!(list = self.name(), %id, position = ?record.position, ?reconciliation, "Updated record");
        Ok(record)
    }

    async fn delete_in(&self, txn: &mut dyn BackendTxn, id: &RecordId) -> Result<Record> {
        let record = self.load(txn, id).await?;
        let snapshot = self.coordinator.snapshot(&record)?;

        txn.delete(self.name(), id).await?;
        let reconciliation = self.coordinator.remove(txn, &snapshot).await?;

        debug!(list = self.name(), %id, ?reconciliation, "Deleted record");
        Ok(record)
    }

    /// Default or clamp the position before the row is written.
    async fn place(
        &self,
        txn: &mut dyn BackendTxn,
        record: &mut Record,
        previous: Option<&Snapshot>,
    ) -> Result<()> {
        let assigned = self
            .coordinator
            .assign_default_position(txn, record, previous)
            .await?;
        if assigned.is_none() {
            self.coordinator
                .clamp_position(txn, record, previous)
                .await?;
        }
        Ok(())
    }

    async fn load(&self, txn: &mut dyn BackendTxn, id: &RecordId) -> Result<Record> {
        txn.get(self.name(), id).await?.ok_or_else(|| {
            BackendError::RecordNotFound {
                list: self.name().to_string(),
                id: id.clone(),
            }
            .into()
        })
    }
}

/// Commit on success, roll back on error.
async fn finish<T>(txn: Box<dyn BackendTxn>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back transaction");
            }
            Err(err)
        }
    }
}
