//! In-memory database backend implementation
//!
//! This module provides an in-memory implementation of the backend traits,
//! suitable for testing, development, or scenarios where data persistence
//! is not strictly required or is handled externally.

mod persistence;
mod storage;

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{BackendImpl, BackendTxn};
use crate::record::{Record, RecordId};
use crate::schema::ListSchema;

/// Rows of one registered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ListTable {
    pub(crate) schema: ListSchema,
    pub(crate) rows: BTreeMap<RecordId, Record>,
}

/// Everything the backend stores.
///
/// Tables sit behind `Arc` so that cloning the state copies only the map;
/// a table is deep-copied the first time a clone mutates it.
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryState {
    pub(crate) lists: BTreeMap<String, Arc<ListTable>>,
}

impl InMemoryState {
    pub(crate) fn table(&self, list: &str) -> Result<&ListTable> {
        self.lists.get(list).map(Arc::as_ref).ok_or_else(|| {
            BackendError::UnknownList {
                list: list.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn table_mut(&mut self, list: &str) -> Result<&mut ListTable> {
        self.lists.get_mut(list).map(Arc::make_mut).ok_or_else(|| {
            BackendError::UnknownList {
                list: list.to_string(),
            }
            .into()
        })
    }
}

/// A simple in-memory store using ordered maps.
///
/// Transactions are serializable: [`begin`](BackendImpl::begin) takes the
/// store's lock for the lifetime of the transaction and works on a private
/// copy of the state, which replaces the shared state on commit and is
/// discarded on rollback or drop. The copy shares every table with the store
/// until the transaction first writes to it, so a transaction pays only for
/// the lists it touches.
///
/// It provides basic persistence capabilities via `save_to_file` and
/// `load_from_file`, serializing the state to JSON.
#[derive(Debug, Default)]
pub struct InMemory {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemory {
    /// Creates a new, empty `InMemory` store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all registered lists.
    pub async fn list_names(&self) -> Vec<String> {
        self.state.lock().await.lists.keys().cloned().collect()
    }

    /// Saves the entire store state to a specified file as JSON.
    ///
    /// # Arguments
    /// * `path` - The path to the file where the state should be saved.
    ///
    /// # Returns
    /// A `Result` indicating success or an I/O or serialization error.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads the store state from a specified JSON file.
    ///
    /// If the file does not exist, a new, empty `InMemory` store is returned.
    ///
    /// # Arguments
    /// * `path` - The path to the file from which to load the state.
    ///
    /// # Returns
    /// A `Result` containing the loaded `InMemory` store or an I/O or deserialization error.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }
}

#[async_trait]
impl BackendImpl for InMemory {
    async fn ensure_list(&self, schema: &ListSchema) -> Result<()> {
        schema.validate()?;
        let mut state = self.state.lock().await;
        match state.lists.get(schema.name()) {
            Some(existing) if existing.schema == *schema => Ok(()),
            Some(_) => Err(BackendError::SchemaMismatch {
                list: schema.name().to_string(),
            }
            .into()),
            None => {
                tracing::debug!(list = schema.name(), "Registered in-memory list");
                state.lists.insert(
                    schema.name().to_string(),
                    Arc::new(ListTable {
                        schema: schema.clone(),
                        rows: BTreeMap::new(),
                    }),
                );
                Ok(())
            }
        }
    }

    async fn begin(&self) -> Result<Box<dyn BackendTxn>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(storage::InMemoryTxn::new(guard)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
