pub mod registry;
pub mod rooms;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ephemeral handle for one WebSocket connection. Assigned at upgrade time,
/// never reused within a process lifetime.
pub type ConnId = u64;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// All live connections by ConnId. Sends to a connection that has already
/// closed are silently dropped — broadcast is fire-and-forget.
pub type Peers = Arc<DashMap<ConnId, ConnectionSender>>;

/// Create a new empty peer map.
pub fn new_peer_map() -> Peers {
    Arc::new(DashMap::new())
}

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next connection id.
pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}
