use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use super::{ID_COLUMN, Record, Row, Storage, StorageError, project};

/// In-memory storage implementation for tests and ephemeral servers
///
/// Each table is a `BTreeMap` keyed by row id, so fetches come back in id
/// order. All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent
/// access. Uses `lock().expect()` which will panic if the mutex is poisoned.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, MemoryTable>>>,
}

#[derive(Default)]
struct MemoryTable {
    /// Last id handed out (0 = none yet)
    last_id: u64,
    /// Rows by id
    rows: BTreeMap<u64, Record>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently in a table.
    ///
    /// Useful for debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn row_count(&self, table: &str) -> usize {
        self.inner.lock().expect("Mutex poisoned").get(table).map_or(0, |t| t.rows.len())
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").finish_non_exhaustive()
    }
}

impl Storage for MemoryStorage {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn insert(&self, table: &str, record: &Record) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let table = inner.entry(table.to_string()).or_default();

        table.last_id += 1;
        let row_id = table.last_id;

        let mut stored = record.clone();
        stored.remove(ID_COLUMN);
        table.rows.insert(row_id, stored);

        Ok(row_id)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn fetch_all(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        Ok(inner.get(table).map_or_else(Vec::new, |t| {
            t.rows.iter().map(|(id, record)| project(*id, record, columns)).collect()
        }))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn delete(&self, table: &str, row_id: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if let Some(table) = inner.get_mut(table) {
            table.rows.remove(&row_id);
        }

        Ok(())
    }
}
