//! JSON event protocol and the per-connection relay dispatcher.
//!
//! Events are tagged by a `type` string. The `register` event carries its
//! fields at the top level; every other kind nests its payload under `data`.
//! Malformed events are logged and discarded without touching the
//! connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calls::{CallRecord, EndedCall};
use crate::messages::{ChatMessage, IncomingMessage};
use crate::state::AppState;
use crate::store;
use crate::ws::broadcast::{broadcast_to_others, send_event};
use crate::ws::ConnectionSender;

/// Identity announced by this connection's `register` event. Unset until
/// the client registers.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
    pub username: String,
}

// --- Inbound events ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Register { user_id: String, username: String },
    Message { data: IncomingMessage },
    Call { data: CallRequest },
    CallAccepted { data: CallRef },
    CallDeclined { data: CallRef },
    CallEnded { data: CallRef },
    WebrtcSignal { data: SignalPayload },
    CheckOnline { data: UserRef },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub call_id: String,
    pub caller_id: String,
    #[serde(default)]
    pub caller_name: String,
    pub recipient_id: String,
    #[serde(default)]
    pub is_video_call: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRef {
    pub call_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub to: String,
    pub signal: Value,
    #[serde(default)]
    pub call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: String,
}

// --- Outbound events ---

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    Connected { message: String },
    #[serde(rename_all = "camelCase")]
    Registered { user_id: String },
    Message { data: ChatMessage },
    Call { data: CallInvite },
    CallFailed { data: CallFailure },
    CallAccepted { data: CallAnswer },
    CallDeclined { data: CallAnswer },
    CallEnded { data: CallClosed },
    WebrtcSignal { data: SignalRelay },
    UserOnline { data: PresenceChange },
    UserOffline { data: PresenceChange },
    OnlineStatus { data: OnlineStatus },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvite {
    pub caller_id: String,
    pub caller_name: String,
    pub call_id: String,
    pub is_video_call: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFailure {
    pub call_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswer {
    pub call_id: String,
    pub recipient_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallClosed {
    pub call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRelay {
    pub from: String,
    pub signal: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub user_id: String,
    pub is_online: bool,
}

// --- Dispatch ---

/// Decode one inbound event and dispatch by kind. Never fails: a payload
/// that does not decode is discarded and the connection stays open.
pub fn handle_event(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    current: &mut Option<CurrentUser>,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Discarding malformed event");
            return;
        }
    };

    match event {
        ClientEvent::Register { user_id, username } => {
            handle_register(state, tx, current, user_id, username);
        }
        ClientEvent::Message { data } => handle_message(state, tx, data),
        ClientEvent::Call { data } => handle_call(state, tx, data),
        ClientEvent::CallAccepted { data } => handle_call_accepted(state, tx, current, data),
        ClientEvent::CallDeclined { data } => handle_call_declined(state, current, data),
        ClientEvent::CallEnded { data } => handle_call_ended(state, tx, data),
        ClientEvent::WebrtcSignal { data } => handle_signal(state, current, data),
        ClientEvent::CheckOnline { data } => handle_check_online(state, tx, data),
    }
}

fn handle_register(
    state: &AppState,
    tx: &ConnectionSender,
    current: &mut Option<CurrentUser>,
    user_id: String,
    username: String,
) {
    state.registry.register(&user_id, &username, tx.clone());
    *current = Some(CurrentUser {
        user_id: user_id.clone(),
        username: username.clone(),
    });

    tracing::info!(user_id = %user_id, username = %username, "User registered");

    send_event(
        tx,
        &ServerEvent::Registered {
            user_id: user_id.clone(),
        },
    );
    broadcast_to_others(
        &state.registry,
        &user_id,
        &ServerEvent::UserOnline {
            data: PresenceChange {
                user_id: user_id.clone(),
                username: Some(username),
            },
        },
    );
}

fn handle_message(state: &AppState, tx: &ConnectionSender, incoming: IncomingMessage) {
    let message = ChatMessage::stamp(incoming);

    // Fire-and-forget persistence: the relay path never waits on the store.
    let store = state.store.clone();
    let persisted = message.clone();
    tokio::spawn(async move {
        if let Err(e) = store.append(store::MESSAGES, &persisted).await {
            tracing::warn!(error = %e, message_id = %persisted.id, "Failed to persist message");
        }
    });

    if let Some(receiver) = state.registry.lookup(&message.receiver_id) {
        send_event(
            &receiver,
            &ServerEvent::Message {
                data: message.clone(),
            },
        );
    }

    // Echo the stamped copy so the sender sees the server-assigned id and
    // timestamp.
    send_event(tx, &ServerEvent::Message { data: message });
}

fn handle_call(state: &AppState, tx: &ConnectionSender, req: CallRequest) {
    let Some(recipient) = state.registry.lookup(&req.recipient_id) else {
        send_event(
            tx,
            &ServerEvent::CallFailed {
                data: CallFailure {
                    call_id: req.call_id,
                    reason: "recipient offline".to_string(),
                },
            },
        );
        return;
    };

    tracing::info!(
        call_id = %req.call_id,
        caller_id = %req.caller_id,
        recipient_id = %req.recipient_id,
        video = req.is_video_call,
        "Call initiated"
    );

    state.calls.insert_ringing(CallRecord::ringing(
        req.call_id.clone(),
        req.caller_id.clone(),
        req.caller_name.clone(),
        req.recipient_id.clone(),
        req.is_video_call,
        tx.clone(),
    ));

    let delivered = send_event(
        &recipient,
        &ServerEvent::Call {
            data: CallInvite {
                caller_id: req.caller_id,
                caller_name: req.caller_name,
                call_id: req.call_id.clone(),
                is_video_call: req.is_video_call,
            },
        },
    );

    if !delivered {
        // The recipient's channel closed between lookup and send: roll the
        // record back and report the failure to the caller.
        state.calls.remove(&req.call_id);
        send_event(
            tx,
            &ServerEvent::CallFailed {
                data: CallFailure {
                    call_id: req.call_id,
                    reason: "recipient offline".to_string(),
                },
            },
        );
    }
}

fn handle_call_accepted(
    state: &AppState,
    tx: &ConnectionSender,
    current: &Option<CurrentUser>,
    data: CallRef,
) {
    let Some(user) = current else {
        return;
    };

    if let Some(caller) = state.calls.accept(&data.call_id, &user.user_id, tx) {
        tracing::info!(call_id = %data.call_id, recipient_id = %user.user_id, "Call accepted");
        send_event(
            &caller,
            &ServerEvent::CallAccepted {
                data: CallAnswer {
                    call_id: data.call_id,
                    recipient_id: user.user_id.clone(),
                },
            },
        );
    }
}

fn handle_call_declined(state: &AppState, current: &Option<CurrentUser>, data: CallRef) {
    let Some(user) = current else {
        return;
    };

    if let Some(caller) = state.calls.decline(&data.call_id, &user.user_id) {
        tracing::info!(call_id = %data.call_id, recipient_id = %user.user_id, "Call declined");
        send_event(
            &caller,
            &ServerEvent::CallDeclined {
                data: CallAnswer {
                    call_id: data.call_id,
                    recipient_id: user.user_id.clone(),
                },
            },
        );
    }
}

fn handle_call_ended(state: &AppState, tx: &ConnectionSender, data: CallRef) {
    if let Some(ended) = state.calls.end(&data.call_id, tx) {
        tracing::info!(call_id = %ended.call_id, "Call ended");
        notify_call_ended(state, ended, None);
    }
}

/// Notify the surviving party of an ended call. A ringing recipient never
/// attached a sender, so they are resolved through the registry at this
/// instant; an unreachable survivor is silently skipped.
pub(crate) fn notify_call_ended(state: &AppState, ended: EndedCall, reason: Option<&str>) {
    let target = ended
        .other
        .or_else(|| state.registry.lookup(&ended.other_user_id));

    if let Some(target) = target {
        send_event(
            &target,
            &ServerEvent::CallEnded {
                data: CallClosed {
                    call_id: ended.call_id,
                    reason: reason.map(str::to_string),
                },
            },
        );
    }
}

fn handle_signal(state: &AppState, current: &Option<CurrentUser>, data: SignalPayload) {
    let Some(user) = current else {
        tracing::debug!("Dropping signal from unregistered connection");
        return;
    };

    match state.registry.lookup(&data.to) {
        Some(target) => {
            send_event(
                &target,
                &ServerEvent::WebrtcSignal {
                    data: SignalRelay {
                        from: user.user_id.clone(),
                        signal: data.signal,
                        call_id: data.call_id,
                    },
                },
            );
        }
        None => {
            tracing::debug!(to = %data.to, "Dropping signal for unreachable target");
        }
    }
}

fn handle_check_online(state: &AppState, tx: &ConnectionSender, data: UserRef) {
    let is_online = state.registry.is_online(&data.user_id);
    send_event(
        tx,
        &ServerEvent::OnlineStatus {
            data: OnlineStatus {
                user_id: data.user_id,
                is_online,
            },
        },
    );
}
