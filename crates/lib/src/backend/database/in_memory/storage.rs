//! Transaction operations for the InMemory backend

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use super::{InMemoryState, ListTable};
use crate::{
    Result,
    backend::{BackendTxn, errors::BackendError},
    coordinator::PositionError,
    record::{Record, RecordId},
    scope::{PositionShift, ScopeFilter},
};

/// An open InMemory transaction.
///
/// Holds the store lock and a working copy of the state. Nothing is visible
/// to other transactions until `commit` swaps the working copy in.
pub(crate) struct InMemoryTxn {
    guard: OwnedMutexGuard<InMemoryState>,
    working: InMemoryState,
}

impl InMemoryTxn {
    pub(crate) fn new(guard: OwnedMutexGuard<InMemoryState>) -> Self {
        let working = (*guard).clone();
        Self { guard, working }
    }
}

/// Rows of a scope sorted by `(position, id)`.
fn sorted_members<'a>(table: &'a ListTable, filter: &ScopeFilter) -> Vec<&'a Record> {
    let mut members: Vec<&Record> = table
        .rows
        .values()
        .filter(|record| filter.matches(&record.fields))
        .collect();
    members.sort_by(|a, b| (a.position, &a.id).cmp(&(b.position, &b.id)));
    members
}

fn require_position(record: &Record) -> Result<i64> {
    record.position.ok_or_else(|| {
        PositionError::MissingPosition {
            id: record.id.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl BackendTxn for InMemoryTxn {
    async fn get(&mut self, list: &str, id: &RecordId) -> Result<Option<Record>> {
        Ok(self.working.table(list)?.rows.get(id).cloned())
    }

    async fn insert(&mut self, list: &str, record: &Record) -> Result<()> {
        require_position(record)?;
        let table = self.working.table_mut(list)?;
        if table.rows.contains_key(&record.id) {
            return Err(BackendError::DuplicateRecord {
                list: list.to_string(),
                id: record.id.clone(),
            }
            .into());
        }
        table.rows.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&mut self, list: &str, record: &Record) -> Result<()> {
        require_position(record)?;
        let table = self.working.table_mut(list)?;
        match table.rows.get_mut(&record.id) {
            Some(row) => {
                *row = record.clone();
                Ok(())
            }
            None => Err(BackendError::RecordNotFound {
                list: list.to_string(),
                id: record.id.clone(),
            }
            .into()),
        }
    }

    async fn delete(&mut self, list: &str, id: &RecordId) -> Result<bool> {
        Ok(self.working.table_mut(list)?.rows.remove(id).is_some())
    }

    async fn members(&mut self, filter: &ScopeFilter) -> Result<Vec<Record>> {
        let table = self.working.table(filter.list())?;
        Ok(sorted_members(table, filter).into_iter().cloned().collect())
    }

    async fn ordered_positions(&mut self, filter: &ScopeFilter) -> Result<Vec<(RecordId, i64)>> {
        let table = self.working.table(filter.list())?;
        sorted_members(table, filter)
            .into_iter()
            .map(|record| Ok((record.id.clone(), require_position(record)?)))
            .collect()
    }

    async fn max_position(&mut self, filter: &ScopeFilter) -> Result<Option<i64>> {
        let table = self.working.table(filter.list())?;
        Ok(table
            .rows
            .values()
            .filter(|record| filter.matches(&record.fields))
            .filter_map(|record| record.position)
            .max())
    }

    async fn shift_positions(&mut self, filter: &ScopeFilter, shift: &PositionShift) -> Result<u64> {
        let table = self.working.table_mut(filter.list())?;
        let mut affected = 0;
        for record in table.rows.values_mut() {
            let Some(position) = record.position else {
                continue;
            };
            if filter.matches(&record.fields) && shift.applies_to(&record.id, position) {
                record.position = Some(position + shift.delta);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn set_position(&mut self, list: &str, id: &RecordId, position: i64) -> Result<()> {
        let table = self.working.table_mut(list)?;
        match table.rows.get_mut(id) {
            Some(record) => {
                record.position = Some(position);
                Ok(())
            }
            None => Err(BackendError::RecordNotFound {
                list: list.to_string(),
                id: id.clone(),
            }
            .into()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTxn { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
