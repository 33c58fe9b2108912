//! Chat messages: the message type, the deterministic chat id shared by
//! both participants, and the REST history/post endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use crate::store;
use crate::ws::broadcast::send_event;
use crate::ws::protocol::ServerEvent;

/// A delivered chat message. Immutable once stamped; `id` and `timestamp`
/// are server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub timestamp: String,
}

/// Message fields as submitted by a client, before the server stamps them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
}

impl ChatMessage {
    /// Assign the server-side id and wall-clock timestamp.
    pub fn stamp(incoming: IncomingMessage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: incoming.chat_id,
            sender_id: incoming.sender_id,
            receiver_id: incoming.receiver_id,
            text: incoming.text,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Both participants derive the same chat id regardless of direction: the
/// two user ids sorted lexicographically, joined with `_`.
pub fn chat_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub success: bool,
    pub message: ChatMessage,
}

/// GET /api/messages/{user_a}/{user_b}: message history for the pair, in
/// either parameter order.
pub async fn message_history(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(String, String)>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let chat = chat_id(&user_a, &user_b);
    let messages: Vec<ChatMessage> =
        state
            .store
            .fetch_collection(store::MESSAGES)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to fetch messages");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

    Ok(Json(
        messages.into_iter().filter(|m| m.chat_id == chat).collect(),
    ))
}

/// POST /api/messages: persist a message and live-relay it to the
/// receiver's connection when they are online.
pub async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<IncomingMessage>,
) -> Result<Json<PostMessageResponse>, StatusCode> {
    if body.chat_id.is_empty()
        || body.sender_id.is_empty()
        || body.receiver_id.is_empty()
        || body.text.is_empty()
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message = ChatMessage::stamp(body);
    state
        .store
        .append(store::MESSAGES, &message)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store message");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if let Some(receiver) = state.registry.lookup(&message.receiver_id) {
        send_event(
            &receiver,
            &ServerEvent::Message {
                data: message.clone(),
            },
        );
    }

    Ok(Json(PostMessageResponse {
        success: true,
        message,
    }))
}

#[cfg(test)]
mod tests {
    use super::chat_id;

    #[test]
    fn chat_id_is_order_insensitive() {
        assert_eq!(chat_id("alice", "bob"), chat_id("bob", "alice"));
        assert_eq!(chat_id("alice", "bob"), "alice_bob");
    }

    #[test]
    fn chat_id_sorts_lexicographically_not_numerically() {
        assert_eq!(chat_id("u2", "u10"), "u10_u2");
    }
}
