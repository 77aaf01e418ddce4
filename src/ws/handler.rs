use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// WebSocket upgrade endpoint. The handshake itself carries no identity:
/// clients announce who they are with a join event, and that announcement
/// is trusted as-is — a known gap for production deployments (see
/// DESIGN.md, Open Questions).
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| actor::run_connection(socket, state))
}
