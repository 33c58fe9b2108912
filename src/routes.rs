use axum::{
    routing::{get, post},
    Router,
};

use crate::messages;
use crate::state::AppState;
use crate::users;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .route("/api/register", post(users::register))
        .route("/api/login", post(users::login))
        .route(
            "/api/messages/{user_a}/{user_b}",
            get(messages::message_history),
        )
        .route("/api/messages", post(messages::post_message));

    // WebSocket endpoint (identity via the register event, not the upgrade)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
