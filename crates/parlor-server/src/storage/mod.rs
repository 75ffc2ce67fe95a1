//! Storage abstraction for Parlor chat history
//!
//! A small relational-style interface: insert a row, fetch every row of a
//! table projected onto some columns, delete a row by id. The trait is
//! synchronous (no async) so the driver stays free of I/O scheduling.
//!
//! Rows are schemaless column → value maps. Every row gets a serial `id`
//! assigned at insert time; ids are never reused, even after deletion.

mod chaotic;
mod error;
mod memory;
mod redb;

use std::{collections::BTreeMap, fmt};

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;

/// Connection identities: `{id, name, addr}`.
pub const CLIENTS_TABLE: &str = "clients";
/// Durable room ids: `{id, key}`.
pub const ROOMS_TABLE: &str = "rooms";
/// Chat history: `{id, room_id, sender_id, recipient_id, timestamp, content}`.
pub const MESSAGES_TABLE: &str = "messages";

/// Implicit row id column, present in every table.
pub const ID_COLUMN: &str = "id";

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value, also returned for columns a row doesn't have
    Null,
    /// Signed integer
    Integer(i64),
    /// UTF-8 text
    Text(String),
}

impl Value {
    /// Integer content. `None` for other variants.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Non-negative integer content. `None` for other variants or negatives.
    pub fn as_id(&self) -> Option<u64> {
        self.as_integer().and_then(|v| u64::try_from(v).ok())
    }

    /// Text content. `None` for other variants.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        // Ids and timestamps stay far below i64::MAX
        Self::Integer(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A row to insert: column name → value. Any `id` entry is ignored.
pub type Record = BTreeMap<String, Value>;

/// A fetched row, one value per requested column, in request order.
pub type Row = Vec<Value>;

/// Build a [`Record`] from `(column, value)` pairs.
pub fn record<I, K, V>(fields: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Project a stored row onto the requested columns.
pub(crate) fn project(row_id: u64, record: &Record, columns: &[&str]) -> Row {
    columns
        .iter()
        .map(|column| {
            if *column == ID_COLUMN {
                Value::from(row_id)
            } else {
                record.get(*column).cloned().unwrap_or(Value::Null)
            }
        })
        .collect()
}

/// Storage abstraction for chat rows
///
/// Must be Clone (the driver and tests can hold handles to the same store),
/// Send + Sync (thread-safe), and synchronous (no async methods).
/// Implementations share internal state via Arc, so clones access the same
/// underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock).
pub trait Storage: Clone + Send + Sync + 'static {
    /// Insert a row and return its freshly assigned id.
    ///
    /// # Invariants
    ///
    /// - Post: returned id is greater than every id previously assigned in
    ///   this table
    fn insert(&self, table: &str, record: &Record) -> Result<u64, StorageError>;

    /// All rows of a table in id order, projected onto `columns`.
    ///
    /// Columns a row lacks project to [`Value::Null`]. A table that was never
    /// written is empty.
    fn fetch_all(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>, StorageError>;

    /// Delete a row by id. Deleting an absent row is a no-op.
    fn delete(&self, table: &str, row_id: u64) -> Result<(), StorageError>;
}
