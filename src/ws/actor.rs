use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::broadcast::{broadcast_to_others, send_event};
use crate::ws::protocol::{self, CurrentUser, PresenceChange, ServerEvent};
use crate::ws::ConnectionSender;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for a WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming events, dispatches to the relay
///
/// The mpsc channel allows any part of the system to send events to this
/// client by cloning the sender. Identity is unknown until the client sends
/// a `register` event; the disconnect cascade runs only for registered
/// connections.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let mut current: Option<CurrentUser> = None;

    send_event(
        &tx,
        &ServerEvent::Connected {
            message: "connection established".to_string(),
        },
    );

    tracing::debug!("WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_event(&text, &tx, &state, &mut current);
                }
                Message::Binary(_) => {
                    tracing::debug!("Received binary frame (expected JSON text), ignoring");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::debug!(reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                break;
            }
            None => {
                // Stream ended, client disconnected
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    disconnect_cleanup(&state, current.as_ref(), &tx);
}

/// Writer task: receives messages from the mpsc channel and forwards them
/// to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}

/// Disconnect cascade for a registered connection: conditioned unregister
/// with an offline presence broadcast, then end every call this connection
/// was part of, notifying each surviving party exactly once.
fn disconnect_cleanup(state: &AppState, current: Option<&CurrentUser>, tx: &ConnectionSender) {
    let Some(user) = current else {
        tracing::debug!("WebSocket actor stopped (never registered)");
        return;
    };

    // Conditioned on connection identity: a superseded connection must not
    // unregister the mapping it no longer owns.
    let was_current = state.registry.unregister_if_same(&user.user_id, tx);
    if was_current {
        broadcast_to_others(
            &state.registry,
            &user.user_id,
            &ServerEvent::UserOffline {
                data: PresenceChange {
                    user_id: user.user_id.clone(),
                    username: None,
                },
            },
        );
    }

    let mut ended = state.calls.end_all_for_connection(tx);
    if was_current {
        ended.extend(state.calls.end_ringing_for_recipient(&user.user_id));
    }

    for call in ended {
        tracing::info!(
            call_id = %call.call_id,
            user_id = %user.user_id,
            "Ending call after disconnect"
        );
        protocol::notify_call_ended(state, call, Some("peer disconnected"));
    }

    tracing::info!(user_id = %user.user_id, "WebSocket actor stopped");
}
