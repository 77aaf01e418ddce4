use std::sync::Arc;

use crate::db::DbPool;
use crate::notify::{NoopNotificationSink, NotificationSink};
use crate::realtime::registry::PresenceRegistry;
use crate::realtime::rooms::RoomManager;
use crate::realtime::{new_peer_map, Peers};

/// Shared application state passed to all handlers via axum State extractor.
///
/// Registry and rooms are lifecycle-scoped here rather than module-level
/// singletons, so multiple server instances (and tests) run isolated.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// Live connection senders by ConnId
    pub peers: Peers,
    /// Durable identity -> live connection mapping
    pub registry: Arc<PresenceRegistry>,
    /// Named broadcast scopes
    pub rooms: Arc<RoomManager>,
    /// Offline delivery capability (no-op by default)
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    /// Build state around an initialized database with the default
    /// (logging no-op) notification sink.
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            peers: new_peer_map(),
            registry: Arc::new(PresenceRegistry::new()),
            rooms: Arc::new(RoomManager::new()),
            notifier: Arc::new(NoopNotificationSink),
        }
    }
}
