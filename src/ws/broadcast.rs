use axum::extract::ws::Message;

use crate::registry::Registry;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionSender;

/// Serialize an event and push it onto one connection's outbound channel.
/// Returns false when the channel is closed.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => tx.send(Message::Text(json.into())).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            false
        }
    }
}

/// Fan an event out to every registered connection except `except_user`.
/// Fire-and-forget: closed channels are skipped, no ordering guarantee
/// across recipients.
pub fn broadcast_to_others(registry: &Registry, except_user: &str, event: &ServerEvent) {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode broadcast event");
            return;
        }
    };
    let msg = Message::Text(json.into());

    for sender in registry.others(except_user) {
        let _ = sender.send(msg.clone());
    }
}
