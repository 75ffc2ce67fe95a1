//! Chat history rows and their display form.
//!
//! Persisted messages reference senders by identity id. [`format_history`]
//! resolves those ids against the `clients` table and renders one
//! `name -> content` line per message, keeping the supplied order.

use std::collections::HashMap;

use crate::storage::{Record, Row, Value, record};

/// Columns of the `messages` table read back by [`ChatMessage::from_row`].
pub const MESSAGE_COLUMNS: [&str; 5] =
    ["room_id", "sender_id", "recipient_id", "timestamp", "content"];

/// Columns of the `clients` table read back by [`identities_from_rows`].
pub const IDENTITY_COLUMNS: [&str; 2] = ["id", "name"];

/// A persisted chat message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Durable room id (`rooms.id`)
    pub room_id: u64,
    /// Sender identity (`clients.id`)
    pub sender_id: u64,
    /// Recipient identity, `None` for room messages
    pub recipient_id: Option<u64>,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    /// Message text without line terminator
    pub content: String,
}

impl ChatMessage {
    /// Row to insert into the `messages` table.
    pub fn to_record(&self) -> Record {
        record([
            ("room_id", Value::from(self.room_id)),
            ("sender_id", Value::from(self.sender_id)),
            ("recipient_id", Value::from(self.recipient_id)),
            ("timestamp", Value::from(self.timestamp)),
            ("content", Value::from(self.content.as_str())),
        ])
    }

    /// Decode a row fetched with [`MESSAGE_COLUMNS`].
    ///
    /// Returns `None` if required columns are missing or mistyped.
    pub fn from_row(row: &[Value]) -> Option<Self> {
        let [room_id, sender_id, recipient_id, timestamp, content] = row else {
            return None;
        };

        Some(Self {
            room_id: room_id.as_id()?,
            sender_id: sender_id.as_id()?,
            recipient_id: recipient_id.as_id(),
            timestamp: timestamp.as_id().unwrap_or_default(),
            content: content.as_text()?.to_string(),
        })
    }
}

/// Build the id → display name map from rows fetched with [`IDENTITY_COLUMNS`].
///
/// Rows without a usable id or name are skipped.
pub fn identities_from_rows(rows: &[Row]) -> HashMap<u64, String> {
    rows.iter()
        .filter_map(|row| match row.as_slice() {
            [id, name] => Some((id.as_id()?, name.as_text()?.to_string())),
            _ => None,
        })
        .collect()
}

/// Render messages as `name -> content` lines, in the order given.
///
/// A sender with no identity entry is shown by its raw id.
pub fn format_history(messages: &[ChatMessage], identities: &HashMap<u64, String>) -> Vec<String> {
    messages
        .iter()
        .map(|message| match identities.get(&message.sender_id) {
            Some(name) => format!("{name} -> {}", message.content),
            None => format!("{} -> {}", message.sender_id, message.content),
        })
        .collect()
}
