//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! All rows and id sequences survive server restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition, TableError};

use super::{ID_COLUMN, Record, Row, Storage, StorageError, project};

/// Table: sequences
/// Key: logical table name
/// Value: last id assigned in that table
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Prefix for per-table row storage, keeps user tables clear of `sequences`
const ROWS_PREFIX: &str = "rows:";

/// Table: rows:<name>
/// Key: row id
/// Value: CBOR-encoded Record
fn rows_table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").finish_non_exhaustive()
    }
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref())?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(SEQUENCES)?;
        }
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn insert(&self, table: &str, record: &Record) -> Result<u64, StorageError> {
        let name = format!("{ROWS_PREFIX}{table}");

        let mut stored = record.clone();
        stored.remove(ID_COLUMN);
        let bytes = encode_record(&stored)?;

        let txn = self.db.begin_write()?;

        let row_id = {
            let mut sequences = txn.open_table(SEQUENCES)?;
            let next = sequences.get(table)?.map_or(1, |last| last.value() + 1);
            sequences.insert(table, next)?;
            next
        };

        {
            let mut rows = txn.open_table(rows_table(&name))?;
            rows.insert(row_id, bytes.as_slice())?;
        }

        txn.commit()?;

        Ok(row_id)
    }

    fn fetch_all(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>, StorageError> {
        let name = format!("{ROWS_PREFIX}{table}");

        let txn = self.db.begin_read()?;
        let rows = match txn.open_table(rows_table(&name)) {
            Ok(rows) => rows,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut result = Vec::new();
        for entry in rows.iter()? {
            let (key, value) = entry?;
            let record = decode_record(value.value())?;
            result.push(project(key.value(), &record, columns));
        }

        Ok(result)
    }

    fn delete(&self, table: &str, row_id: u64) -> Result<(), StorageError> {
        let name = format!("{ROWS_PREFIX}{table}");

        let txn = self.db.begin_write()?;
        {
            let mut rows = txn.open_table(rows_table(&name))?;
            rows.remove(row_id)?;
        }
        txn.commit()?;

        Ok(())
    }
}

fn encode_record(record: &Record) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_record(bytes: &[u8]) -> Result<Record, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
