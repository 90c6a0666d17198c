//! JSON snapshots of an InMemory store.
//!
//! The file holds a format version and every list with its schema and rows.
//! Loading re-validates each schema and checks every row against it: fields
//! must match the declared columns and every row needs a position, so a
//! hand-edited file cannot smuggle a malformed row into a scope. Scopes that are not dense are loaded as-is and reported with a
//! warning; [`renumber`](crate::list::PositionedList::renumber) repairs them.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{InMemory, InMemoryState, ListTable};
use crate::{
    Error, Result,
    backend::errors::BackendError,
    scope::ScopeKey,
};

/// Format written by [`save_to_file`].
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    format: u32,
    #[serde(default)]
    lists: BTreeMap<String, ListTable>,
}

/// Write the whole store to `path` as pretty-printed JSON.
pub(crate) async fn save_to_file<P: AsRef<Path>>(backend: &InMemory, path: P) -> Result<()> {
    let file = StoreFile {
        format: FORMAT_VERSION,
        lists: backend
            .state
            .lock()
            .await
            .lists
            .iter()
            .map(|(name, table)| (name.clone(), ListTable::clone(table)))
            .collect(),
    };

    let json = serde_json::to_string_pretty(&file)
        .map_err(|source| -> Error { BackendError::SerializationFailed { source }.into() })?;
    tokio::fs::write(path.as_ref(), json)
        .await
        .map_err(|source| -> Error { BackendError::FileIo { source }.into() })?;
    tracing::debug!(path = %path.as_ref().display(), "Saved in-memory store");
    Ok(())
}

/// Read a store written by [`save_to_file`].
///
/// A missing file yields an empty store.
pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    let json = match tokio::fs::read_to_string(path.as_ref()).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.as_ref().display(), "No store file, starting empty");
            return Ok(InMemory::new());
        }
        Err(source) => return Err(BackendError::FileIo { source }.into()),
    };

    let file: StoreFile = serde_json::from_str(&json)
        .map_err(|source| -> Error { BackendError::DeserializationFailed { source }.into() })?;
    if file.format != FORMAT_VERSION {
        return Err(BackendError::InvalidConfig {
            reason: format!(
                "store file format {} is not supported (expected {FORMAT_VERSION})",
                file.format
            ),
        }
        .into());
    }

    let mut lists = BTreeMap::new();
    for (name, mut table) in file.lists {
        check_table(&name, &mut table)?;
        lists.insert(name, Arc::new(table));
    }

    Ok(InMemory {
        state: Arc::new(Mutex::new(InMemoryState { lists })),
    })
}

fn check_table(name: &str, table: &mut ListTable) -> Result<()> {
    table.schema.validate()?;
    if name != table.schema.name() {
        return Err(BackendError::SchemaMismatch {
            list: name.to_string(),
        }
        .into());
    }

    let mut scopes: HashMap<ScopeKey, Vec<i64>> = HashMap::new();
    for (id, record) in table.rows.iter_mut() {
        if id != &record.id {
            return Err(BackendError::CorruptRow {
                list: name.to_string(),
                reason: format!("row '{id}' holds a record with id '{}'", record.id),
            }
            .into());
        }
        table
            .schema
            .normalize_fields(&mut record.fields)
            .map_err(|e| -> Error {
                BackendError::CorruptRow {
                    list: name.to_string(),
                    reason: format!("row '{id}': {e}"),
                }
                .into()
            })?;
        let position = record.position.ok_or_else(|| -> Error {
            BackendError::CorruptRow {
                list: name.to_string(),
                reason: format!("row '{id}' has no position"),
            }
            .into()
        })?;
        let key = ScopeKey::new(
            table
                .schema
                .scope_fields()
                .iter()
                .map(|field| record.field(field).clone()),
        );
        scopes.entry(key).or_default().push(position);
    }

    for (key, mut positions) in scopes {
        positions.sort_unstable();
        let dense = positions.iter().zip(1..).all(|(&p, expected)| p == expected);
        if !dense {
            tracing::warn!(
                list = name,
                scope = %key,
                members = positions.len(),
                "Loaded scope is not dense"
            );
        }
    }
    Ok(())
}
