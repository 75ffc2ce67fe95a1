//! Client registry: live connections in accept order.
//!
//! A connection's position in the registry is its addressable index for
//! `/to` messages. Disconnects remove the entry, so indices stay dense and
//! every connection registered after the departing one shifts down by one.
//! Lookups by a stale index return `None` and callers treat that as a no-op.

use std::collections::HashMap;

/// Runtime-assigned identity of one live connection.
pub type ConnectionId = u64;

/// Information about a registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Peer address as reported by the transport
    pub peer_addr: String,
    /// Row id in the `clients` table, once persisted
    pub identity_id: Option<u64>,
}

impl ClientInfo {
    /// Create info for a connection that has no persisted identity yet.
    pub fn new(peer_addr: impl Into<String>) -> Self {
        Self { peer_addr: peer_addr.into(), identity_id: None }
    }
}

/// Ordered registry of live connections.
///
/// A connection appears at most once. `all()` returns an owned snapshot so a
/// broadcast can iterate while the registry keeps changing.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    /// Connection ids in registration order
    order: Vec<ConnectionId>,
    /// Connection id → client info
    clients: HashMap<ConnectionId, ClientInfo>,
}

impl ClientRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection at the end of the registry.
    ///
    /// Returns `false` (and changes nothing) if the connection is already
    /// registered.
    pub fn register(&mut self, connection_id: ConnectionId, info: ClientInfo) -> bool {
        if self.clients.contains_key(&connection_id) {
            return false;
        }

        self.order.push(connection_id);
        self.clients.insert(connection_id, info);
        true
    }

    /// Remove a connection. Safe to call for unknown connections.
    ///
    /// Returns the client info if the connection was registered.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<ClientInfo> {
        self.order.retain(|id| *id != connection_id);
        self.clients.remove(&connection_id)
    }

    /// Connection at a registry index. `None` if out of range.
    pub fn at(&self, index: usize) -> Option<ConnectionId> {
        self.order.get(index).copied()
    }

    /// Snapshot of all registered connections in index order.
    pub fn all(&self) -> Vec<ConnectionId> {
        self.order.clone()
    }

    /// Current index of a connection. `None` if not registered.
    pub fn index_of(&self, connection_id: ConnectionId) -> Option<usize> {
        self.order.iter().position(|id| *id == connection_id)
    }

    /// Client info. `None` if connection doesn't exist.
    pub fn info(&self, connection_id: ConnectionId) -> Option<&ClientInfo> {
        self.clients.get(&connection_id)
    }

    /// Mutable client info. `None` if connection doesn't exist.
    pub fn info_mut(&mut self, connection_id: ConnectionId) -> Option<&mut ClientInfo> {
        self.clients.get_mut(&connection_id)
    }

    /// Check if a connection is registered.
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.clients.contains_key(&connection_id)
    }

    /// Total number of registered connections.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
