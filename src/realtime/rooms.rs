//! Room manager: groups connections into named broadcast scopes.
//!
//! Room ids are `chat_<chatId>`, `user_<userId>`, `taxi_<taxiId>` and
//! `passenger_<passengerId>`. A frame sent to a room reaches exactly its
//! current members; delivery is best-effort, at-most-once per connected
//! member, with no persistence or retry.

use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;

use super::{ConnId, Peers};

#[derive(Debug, Default)]
pub struct RoomManager {
    /// room -> member connections
    members: DashMap<String, HashSet<ConnId>>,
    /// connection -> joined rooms, for leave-all on disconnect
    joined: DashMap<ConnId, HashSet<String>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Authorization (for chat rooms) happens
    /// before this call; the manager itself never consults durable state.
    pub fn join(&self, conn_id: ConnId, room: &str) {
        self.members
            .entry(room.to_string())
            .or_default()
            .insert(conn_id);
        self.joined
            .entry(conn_id)
            .or_default()
            .insert(room.to_string());
    }

    /// Remove a connection from a room. No explicit client event drives
    /// this today; disconnect goes through leave_all.
    #[allow(dead_code)]
    pub fn leave(&self, conn_id: ConnId, room: &str) {
        let mut empty = false;
        if let Some(mut set) = self.members.get_mut(room) {
            set.remove(&conn_id);
            empty = set.is_empty();
        }
        if empty {
            self.members.remove_if(room, |_, set| set.is_empty());
        }
        if let Some(mut rooms) = self.joined.get_mut(&conn_id) {
            rooms.remove(room);
        }
    }

    /// Remove a connection from every room it joined. Called exactly once
    /// from the connection actor's cleanup path.
    pub fn leave_all(&self, conn_id: ConnId) {
        if let Some((_, rooms)) = self.joined.remove(&conn_id) {
            for room in rooms {
                let mut empty = false;
                if let Some(mut set) = self.members.get_mut(&room) {
                    set.remove(&conn_id);
                    empty = set.is_empty();
                }
                if empty {
                    self.members.remove_if(&room, |_, set| set.is_empty());
                }
            }
        }
    }

    #[allow(dead_code)]
    pub fn is_member(&self, conn_id: ConnId, room: &str) -> bool {
        self.members
            .get(room)
            .map(|set| set.contains(&conn_id))
            .unwrap_or(false)
    }

    /// Current member count of a room.
    #[allow(dead_code)]
    pub fn member_count(&self, room: &str) -> usize {
        self.members.get(room).map(|set| set.len()).unwrap_or(0)
    }

    /// Rooms a connection currently belongs to.
    #[allow(dead_code)]
    pub fn rooms_of(&self, conn_id: ConnId) -> Vec<String> {
        self.joined
            .get(&conn_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver a frame to every live member of `room`, optionally excluding
    /// one connection (the sender). A member whose channel has closed is
    /// skipped — disconnect racing a broadcast is tolerated, not an error.
    pub fn broadcast(&self, peers: &Peers, room: &str, frame: &Message, exclude: Option<ConnId>) {
        let targets: Vec<ConnId> = match self.members.get(room) {
            Some(set) => set
                .iter()
                .copied()
                .filter(|id| Some(*id) != exclude)
                .collect(),
            None => return,
        };

        for conn_id in targets {
            if let Some(sender) = peers.get(&conn_id) {
                let _ = sender.send(frame.clone());
            }
        }
    }
}

/// Deliver a frame to every live connection, optionally excluding one.
/// Used for the events (taxi locations, doctor availability) that go to
/// every connection rather than a room.
pub fn broadcast_to_all(peers: &Peers, frame: &Message, exclude: Option<ConnId>) {
    for entry in peers.iter() {
        if Some(*entry.key()) == exclude {
            continue;
        }
        let _ = entry.value().send(frame.clone());
    }
}

/// Deliver a frame to one specific connection, if still present.
pub fn send_to_conn(peers: &Peers, conn_id: ConnId, frame: &Message) {
    if let Some(sender) = peers.get(&conn_id) {
        let _ = sender.send(frame.clone());
    }
}
