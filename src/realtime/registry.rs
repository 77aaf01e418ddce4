//! Connection registry: live mapping from durable identities to connections.
//!
//! Owned by AppState so each server instance (and each test) gets an
//! isolated registry. At most one entry per identity — a later register for
//! the same identity overwrites the earlier one (last writer wins).

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::ConnId;

/// Durable identity a connection can announce. Drivers announce the taxi
/// they operate, so taxi ids and user ids live in separate namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    User(String),
    Taxi(String),
    Passenger(String),
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKey::User(id) => write!(f, "user:{id}"),
            IdentityKey::Taxi(id) => write!(f, "taxi:{id}"),
            IdentityKey::Passenger(id) => write!(f, "passenger:{id}"),
        }
    }
}

/// What the registry records per identity.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub conn_id: ConnId,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// In-memory presence registry. All mutations are atomic with respect to
/// concurrent lookups (DashMap shard locks); no durable writes.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: DashMap<IdentityKey, PresenceEntry>,
    /// Reverse index for O(1) disconnect purge.
    by_conn: DashMap<ConnId, Vec<IdentityKey>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `identity`. Overwrite is deliberate:
    /// a reconnecting client simply takes over its identity.
    pub fn register(&self, identity: IdentityKey, conn_id: ConnId, role: &str) {
        self.entries.insert(
            identity.clone(),
            PresenceEntry {
                conn_id,
                role: role.to_string(),
                joined_at: Utc::now(),
            },
        );

        let mut keys = self.by_conn.entry(conn_id).or_default();
        if !keys.contains(&identity) {
            keys.push(identity);
        }
    }

    /// Connection currently holding `identity`, if any. Used to decide
    /// "deliver live" vs "hand off to the offline notification sink".
    pub fn lookup(&self, identity: &IdentityKey) -> Option<ConnId> {
        self.entries.get(identity).map(|e| e.conn_id)
    }

    /// Purge every identity held by `conn_id`. An entry is only removed if
    /// it still points at this connection: a newer last-writer-wins
    /// registration for the same identity must survive the old
    /// connection's disconnect.
    pub fn remove(&self, conn_id: ConnId) {
        if let Some((_, keys)) = self.by_conn.remove(&conn_id) {
            for key in keys {
                self.entries.remove_if(&key, |_, entry| entry.conn_id == conn_id);
            }
        }
    }

    /// Number of identities currently registered.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
