//! Message router.
//!
//! Resolves an intent into concrete deliveries against the client and room
//! registries. The router never touches a transport: every method returns the
//! list of `(recipient, payload)` pairs and the caller performs the sends, so
//! one failed recipient cannot affect the others.
//!
//! Absent targets (stale index, empty room) resolve to an empty delivery list.

use std::collections::HashMap;

use crate::{
    history::{self, ChatMessage, IDENTITY_COLUMNS, MESSAGE_COLUMNS},
    registry::{ClientInfo, ClientRegistry, ConnectionId},
    room_registry::RoomRegistry,
    storage::{
        CLIENTS_TABLE, ID_COLUMN, MESSAGES_TABLE, ROOMS_TABLE, Storage, StorageError, Value,
        record,
    },
};

/// Column holding the room key in the `rooms` table.
const ROOM_KEY_COLUMN: &str = "key";

/// One payload addressed to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipient connection
    pub to: ConnectionId,
    /// Text to write, verbatim
    pub payload: String,
}

impl Delivery {
    /// Create a delivery.
    pub fn new(to: ConnectionId, payload: impl Into<String>) -> Self {
        Self { to, payload: payload.into() }
    }
}

/// Routes payloads between registered connections and persists room history.
pub struct MessageRouter<S: Storage> {
    clients: ClientRegistry,
    rooms: RoomRegistry,
    /// Room key → durable `rooms.id`, filled lazily
    room_ids: HashMap<String, u64>,
    storage: S,
}

impl<S: Storage> MessageRouter<S> {
    /// Create a router with empty registries.
    pub fn new(storage: S) -> Self {
        Self {
            clients: ClientRegistry::new(),
            rooms: RoomRegistry::new(),
            room_ids: HashMap::new(),
            storage,
        }
    }

    /// Register a connection. `false` if it was already registered.
    pub fn register(&mut self, connection_id: ConnectionId, info: ClientInfo) -> bool {
        self.clients.register(connection_id, info)
    }

    /// Remove a connection from the client registry and every room.
    ///
    /// Returns the client info and the rooms it was in, or `None` if the
    /// connection was not registered.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<(ClientInfo, usize)> {
        let rooms = self.rooms.leave_all(connection_id);
        self.clients.unregister(connection_id).map(|info| (info, rooms.len()))
    }

    /// Persist an identity row for a registered connection.
    ///
    /// The row is named `guest-<connection_id>`. On success the row id is
    /// remembered so the connection's room messages can reference it.
    pub fn persist_identity(&mut self, connection_id: ConnectionId) -> Result<u64, StorageError> {
        let addr = self
            .clients
            .info(connection_id)
            .map(|info| info.peer_addr.clone())
            .unwrap_or_default();

        let row = record([
            ("name", Value::from(format!("guest-{connection_id}"))),
            ("addr", Value::from(addr)),
        ]);
        let identity_id = self.storage.insert(CLIENTS_TABLE, &row)?;

        if let Some(info) = self.clients.info_mut(connection_id) {
            info.identity_id = Some(identity_id);
        }

        Ok(identity_id)
    }

    /// Deliver to every registered connection except `sender`.
    pub fn broadcast(&self, sender: ConnectionId, payload: &str) -> Vec<Delivery> {
        self.clients
            .all()
            .into_iter()
            .filter(|&id| id != sender)
            .map(|id| Delivery::new(id, payload))
            .collect()
    }

    /// Deliver to the connection at `index` in the client registry.
    pub fn direct(&self, index: usize, payload: &str) -> Vec<Delivery> {
        self.clients.at(index).map(|id| Delivery::new(id, payload)).into_iter().collect()
    }

    /// Deliver to every current member of `room_key`.
    pub fn room_broadcast(&self, room_key: &str, payload: &str) -> Vec<Delivery> {
        self.rooms
            .members_of(room_key)
            .into_iter()
            .map(|id| Delivery::new(id, payload))
            .collect()
    }

    /// Join `room_key`, creating it on first use.
    ///
    /// Returns `false` if the connection was already a member.
    pub fn join_or_create(&mut self, room_key: &str, connection_id: ConnectionId) -> bool {
        self.rooms.join(room_key, connection_id)
    }

    /// Durable id of `room_key`, inserting a `rooms` row on first use.
    pub fn room_id(&mut self, room_key: &str) -> Result<u64, StorageError> {
        if let Some(&id) = self.room_ids.get(room_key) {
            return Ok(id);
        }

        let existing = self
            .storage
            .fetch_all(ROOMS_TABLE, &[ID_COLUMN, ROOM_KEY_COLUMN])?
            .into_iter()
            .find_map(|row| match row.as_slice() {
                [id, key] if key.as_text() == Some(room_key) => id.as_id(),
                _ => None,
            });

        let id = match existing {
            Some(id) => id,
            None => self.storage.insert(ROOMS_TABLE, &record([(ROOM_KEY_COLUMN, room_key)]))?,
        };

        self.room_ids.insert(room_key.to_string(), id);
        Ok(id)
    }

    /// Append one message to the `messages` table.
    pub fn append_history(&self, message: &ChatMessage) -> Result<u64, StorageError> {
        self.storage.insert(MESSAGES_TABLE, &message.to_record())
    }

    /// Formatted history of `room_id`, addressed to `requester`.
    ///
    /// One delivery per persisted message, in insertion order. Senders are
    /// resolved to display names through the `clients` table.
    pub fn fetch_history(
        &self,
        requester: ConnectionId,
        room_id: u64,
    ) -> Result<Vec<Delivery>, StorageError> {
        let messages: Vec<ChatMessage> = self
            .storage
            .fetch_all(MESSAGES_TABLE, &MESSAGE_COLUMNS)?
            .iter()
            .filter_map(|row| ChatMessage::from_row(row))
            .filter(|message| message.room_id == room_id)
            .collect();

        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let identities =
            history::identities_from_rows(&self.storage.fetch_all(CLIENTS_TABLE, &IDENTITY_COLUMNS)?);

        Ok(history::format_history(&messages, &identities)
            .into_iter()
            .map(|line| Delivery::new(requester, line))
            .collect())
    }

    /// Client registry.
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Room registry.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<S: Storage> std::fmt::Debug for MessageRouter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("client_count", &self.clients.len())
            .field("room_count", &self.rooms.room_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChaoticStorage, MemoryStorage};

    fn router_with(ids: &[ConnectionId]) -> MessageRouter<MemoryStorage> {
        let mut router = MessageRouter::new(MemoryStorage::new());
        for &id in ids {
            router.register(id, ClientInfo::new(format!("127.0.0.1:{}", 40000 + id)));
        }
        router
    }

    fn recipients(deliveries: &[Delivery]) -> Vec<ConnectionId> {
        deliveries.iter().map(|d| d.to).collect()
    }

    #[test]
    fn broadcast_excludes_sender() {
        let router = router_with(&[1, 2, 3]);

        let deliveries = router.broadcast(1, "P");

        assert_eq!(deliveries, vec![Delivery::new(2, "P"), Delivery::new(3, "P")]);
    }

    #[test]
    fn broadcast_from_lone_client_reaches_nobody() {
        let router = router_with(&[1]);

        assert!(router.broadcast(1, "P").is_empty());
    }

    #[test]
    fn direct_addresses_by_index() {
        let router = router_with(&[10, 20, 30]);

        assert_eq!(router.direct(1, "P"), vec![Delivery::new(20, "P")]);
        assert!(router.direct(5, "P").is_empty());
    }

    #[test]
    fn direct_index_shifts_after_unregister() {
        let mut router = router_with(&[10, 20, 30]);

        router.unregister(20);

        assert_eq!(recipients(&router.direct(1, "P")), vec![30]);
        assert!(router.direct(2, "P").is_empty());
    }

    #[test]
    fn room_broadcast_reaches_members_only() {
        let mut router = router_with(&[1, 2, 3]);
        router.join_or_create("lobby", 1);
        router.join_or_create("lobby", 3);

        assert_eq!(recipients(&router.room_broadcast("lobby", "yo\n\r")), vec![1, 3]);
        assert!(router.room_broadcast("attic", "yo\n\r").is_empty());
    }

    #[test]
    fn join_is_idempotent() {
        let mut router = router_with(&[1]);

        assert!(router.join_or_create("lobby", 1));
        assert!(!router.join_or_create("lobby", 1));
        assert_eq!(recipients(&router.room_broadcast("lobby", "x")), vec![1]);
    }

    #[test]
    fn unregister_prunes_room_membership() {
        let mut router = router_with(&[1, 2]);
        router.join_or_create("lobby", 1);
        router.join_or_create("den", 1);
        router.join_or_create("lobby", 2);

        let (_, room_count) = router.unregister(1).unwrap();

        assert_eq!(room_count, 2);
        assert_eq!(recipients(&router.room_broadcast("lobby", "x")), vec![2]);
        assert!(!router.rooms().has_room("den"));
    }

    #[test]
    fn room_id_is_stable_per_key() {
        let mut router = router_with(&[]);

        let lobby = router.room_id("lobby").unwrap();
        let den = router.room_id("den").unwrap();

        assert_ne!(lobby, den);
        assert_eq!(router.room_id("lobby").unwrap(), lobby);
        assert_eq!(router.storage().row_count(ROOMS_TABLE), 2);
    }

    #[test]
    fn room_id_is_found_in_shared_storage() {
        let storage = MemoryStorage::new();
        let mut first = MessageRouter::new(storage.clone());
        let id = first.room_id("lobby").unwrap();

        let mut second = MessageRouter::new(storage);

        assert_eq!(second.room_id("lobby").unwrap(), id);
    }

    #[test]
    fn history_filters_by_room_and_resolves_names() {
        let mut router = router_with(&[1, 2]);
        let jack = router.persist_identity(1).unwrap();
        let lobby = router.room_id("lobby").unwrap();
        let den = router.room_id("den").unwrap();

        for (room_id, sender_id, content) in
            [(lobby, jack, "hi"), (den, jack, "elsewhere"), (lobby, 99, "ghost")]
        {
            router
                .append_history(&ChatMessage {
                    room_id,
                    sender_id,
                    recipient_id: None,
                    timestamp: 0,
                    content: content.to_string(),
                })
                .unwrap();
        }

        let deliveries = router.fetch_history(2, lobby).unwrap();

        assert_eq!(deliveries, vec![Delivery::new(2, "guest-1 -> hi"), Delivery::new(2, "99 -> ghost")]);
    }

    #[test]
    fn history_of_unknown_room_is_empty() {
        let router = router_with(&[1]);

        assert!(router.fetch_history(1, 42).unwrap().is_empty());
    }

    #[test]
    fn persist_identity_records_row_id() {
        let mut router = router_with(&[7]);

        let id = router.persist_identity(7).unwrap();

        assert_eq!(router.clients().info(7).unwrap().identity_id, Some(id));
        let rows = router.storage().fetch_all(CLIENTS_TABLE, &["name", "addr"]).unwrap();
        assert_eq!(rows, vec![vec![Value::from("guest-7"), Value::from("127.0.0.1:40007")]]);
    }

    #[test]
    fn storage_failure_surfaces_from_history() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let router = MessageRouter::new(storage);

        assert!(router.fetch_history(1, 1).is_err());
    }
}
