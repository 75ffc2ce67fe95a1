//! Room registry for room membership tracking.
//!
//! The registry maintains bidirectional mappings: room → connections (for
//! room broadcast) and connection → rooms (for cleanup on disconnect).
//!
//! Rooms are lazy: joining an unknown key creates it, and a room whose last
//! member leaves is dropped. An empty room and a missing room are the same
//! thing to every caller. Membership is by connection id only; the registry
//! never holds a transport handle.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::registry::ConnectionId;

/// Registry of named rooms and their members.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Room key → member connections
    rooms: HashMap<String, BTreeSet<ConnectionId>>,
    /// Connection → keys of rooms it belongs to
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

impl RoomRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if absent.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, room_key: &str, connection_id: ConnectionId) -> bool {
        let added = self.rooms.entry(room_key.to_string()).or_default().insert(connection_id);
        self.memberships.entry(connection_id).or_default().insert(room_key.to_string());
        added
    }

    /// Remove a connection from every room it joined.
    ///
    /// Returns the keys of the rooms it left.
    pub fn leave_all(&mut self, connection_id: ConnectionId) -> HashSet<String> {
        let keys = self.memberships.remove(&connection_id).unwrap_or_default();

        for key in &keys {
            if let Some(members) = self.rooms.get_mut(key) {
                members.remove(&connection_id);
                if members.is_empty() {
                    self.rooms.remove(key);
                }
            }
        }

        keys
    }

    /// Members of a room. Empty if the room doesn't exist.
    pub fn members_of(&self, room_key: &str) -> BTreeSet<ConnectionId> {
        self.rooms.get(room_key).cloned().unwrap_or_default()
    }

    /// Keys of all rooms a connection belongs to.
    pub fn rooms_for(&self, connection_id: ConnectionId) -> impl Iterator<Item = &str> + '_ {
        self.memberships.get(&connection_id).into_iter().flat_map(|k| k.iter().map(String::as_str))
    }

    /// `true` if the room has at least one member.
    pub fn has_room(&self, room_key: &str) -> bool {
        self.rooms.contains_key(room_key)
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_creates_room() {
        let mut rooms = RoomRegistry::new();

        assert!(!rooms.has_room("lobby"));
        assert!(rooms.join("lobby", 1));
        assert!(rooms.has_room("lobby"));
        assert_eq!(rooms.members_of("lobby"), BTreeSet::from([1]));
    }

    #[test]
    fn duplicate_join_is_noop() {
        let mut rooms = RoomRegistry::new();

        assert!(rooms.join("lobby", 1));
        assert!(!rooms.join("lobby", 1));
        assert_eq!(rooms.members_of("lobby").len(), 1);
    }

    #[test]
    fn unknown_room_has_no_members() {
        let rooms = RoomRegistry::new();
        assert!(rooms.members_of("nowhere").is_empty());
    }

    #[test]
    fn keys_are_case_sensitive() {
        let mut rooms = RoomRegistry::new();

        rooms.join("Lobby", 1);
        rooms.join("lobby", 2);

        assert_eq!(rooms.members_of("Lobby"), BTreeSet::from([1]));
        assert_eq!(rooms.members_of("lobby"), BTreeSet::from([2]));
    }

    #[test]
    fn leave_all_removes_every_membership() {
        let mut rooms = RoomRegistry::new();

        rooms.join("a", 1);
        rooms.join("b", 1);
        rooms.join("a", 2);

        let left = rooms.leave_all(1);
        assert_eq!(left, HashSet::from(["a".to_string(), "b".to_string()]));

        assert_eq!(rooms.members_of("a"), BTreeSet::from([2]));
        // Room b has no members left and is dropped
        assert!(!rooms.has_room("b"));
        assert_eq!(rooms.room_count(), 1);
    }

    #[test]
    fn connection_can_join_many_rooms() {
        let mut rooms = RoomRegistry::new();

        rooms.join("a", 1);
        rooms.join("b", 1);

        let keys: HashSet<_> = rooms.rooms_for(1).collect();
        assert_eq!(keys, HashSet::from(["a", "b"]));
    }
}
