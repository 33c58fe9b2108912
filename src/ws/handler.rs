use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// WebSocket upgrade endpoint. The upgrade itself is unauthenticated;
/// identity arrives afterwards via the `register` event.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| actor::run_connection(socket, state))
}
