pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system clone this to push events to a specific client;
/// a failed send means the peer is gone and the target is treated as
/// unreachable for that one attempt.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;
