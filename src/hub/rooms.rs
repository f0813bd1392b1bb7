//! Room membership index
//!
//! Keeps both directions of the membership relation so that a connection
//! can be dropped from every room it joined without scanning the whole
//! index. Mutated only by the hub control loop.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::connection::ConnectionId;

/// Prefix of guild-wide rooms
pub const GUILD_ROOM_PREFIX: &str = "guild:";

/// Prefix of direct-conversation rooms
pub const CONVERSATION_ROOM_PREFIX: &str = "dm:";

/// Opaque room identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Room scoped to a single channel: the channel id itself
    pub fn channel(channel_id: &str) -> Self {
        Self(channel_id.to_string())
    }

    /// Guild-wide room for presence, lifecycle and LFG events
    pub fn guild(guild_id: &str) -> Self {
        Self(format!("{GUILD_ROOM_PREFIX}{guild_id}"))
    }

    /// Room of a direct conversation
    pub fn conversation(conversation_id: &str) -> Self {
        Self(format!("{CONVERSATION_ROOM_PREFIX}{conversation_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RoomId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Mapping room → members, mirrored by connection → rooms.
///
/// Invariants:
/// - `c ∈ rooms[r]` iff `r ∈ memberships[c]`
/// - no entry in either map holds an empty set
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to `room`. Returns false if it was already a member.
    pub fn subscribe(&mut self, conn: ConnectionId, room: RoomId) -> bool {
        let added = self.rooms.entry(room.clone()).or_default().insert(conn);
        if added {
            self.memberships.entry(conn).or_default().insert(room);
        }
        added
    }

    /// Remove `conn` from `room`. Returns false if it was not a member.
    pub fn unsubscribe(&mut self, conn: ConnectionId, room: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        if !members.remove(&conn) {
            return false;
        }
        if members.is_empty() {
            self.rooms.remove(room);
        }

        if let Some(joined) = self.memberships.get_mut(&conn) {
            joined.remove(room);
            if joined.is_empty() {
                self.memberships.remove(&conn);
            }
        }
        true
    }

    /// Drop `conn` from every room, deleting rooms left empty.
    /// Returns the rooms it was removed from.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Vec<RoomId> {
        let Some(joined) = self.memberships.remove(&conn) else {
            return Vec::new();
        };

        let mut left = Vec::with_capacity(joined.len());
        for room in joined {
            if let Some(members) = self.rooms.get_mut(&room) {
                members.remove(&conn);
                if members.is_empty() {
                    self.rooms.remove(&room);
                }
            }
            left.push(room);
        }
        left
    }

    /// Members of a room, if it exists
    pub fn members(&self, room: &str) -> Option<&HashSet<ConnectionId>> {
        self.rooms.get(room)
    }

    /// Rooms a connection is subscribed to
    pub fn rooms_of(&self, conn: ConnectionId) -> Vec<RoomId> {
        self.memberships
            .get(&conn)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, conn: ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&conn))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
        self.memberships.clear();
    }

    /// Verify both directions agree and no empty sets linger
    pub fn is_consistent(&self) -> bool {
        let forward = self.rooms.iter().all(|(room, members)| {
            !members.is_empty()
                && members.iter().all(|conn| {
                    self.memberships
                        .get(conn)
                        .is_some_and(|joined| joined.contains(room))
                })
        });
        let backward = self.memberships.iter().all(|(conn, joined)| {
            !joined.is_empty()
                && joined.iter().all(|room| {
                    self.rooms
                        .get(room)
                        .is_some_and(|members| members.contains(conn))
                })
        });
        forward && backward
    }
}
