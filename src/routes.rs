use axum::{Json, Router};
use chrono::Utc;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router. The HTTP surface is intentionally small: the
/// platform's CRUD endpoints live in a separate service layer; this
/// process owns the realtime core.
pub fn build_router(state: AppState) -> Router {
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new().merge(ws_routes).merge(health).with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "MediCab realtime server",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
