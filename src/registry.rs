use dashmap::DashMap;
use std::sync::Arc;

use crate::ws::ConnectionSender;

/// One user's live session: the cached display name plus the single
/// connection currently representing them.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub sender: ConnectionSender,
}

/// In-memory user -> connection registry.
///
/// At most one live connection per user id. Registering again on a new
/// connection silently supersedes the old mapping; the orphaned connection
/// keeps its transport open but is no longer reachable through the registry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sessions: Arc<DashMap<String, Session>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the mapping for a user. Duplicate registration is defined
    /// behavior: the new connection wins.
    pub fn register(&self, user_id: &str, username: &str, sender: ConnectionSender) {
        self.sessions.insert(
            user_id.to_string(),
            Session {
                username: username.to_string(),
                sender,
            },
        );
    }

    /// Resolve a user's current connection, if any.
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionSender> {
        self.sessions.get(user_id).map(|s| s.sender.clone())
    }

    pub fn username(&self, user_id: &str) -> Option<String> {
        self.sessions.get(user_id).map(|s| s.username.clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Remove the mapping only if `sender` is still the connection on
    /// record. A superseded connection's disconnect must not unregister a
    /// mapping it no longer owns.
    pub fn unregister_if_same(&self, user_id: &str, sender: &ConnectionSender) -> bool {
        self.sessions
            .remove_if(user_id, |_, s| s.sender.same_channel(sender))
            .is_some()
    }

    /// Snapshot of every session's sender except `except_user`, for
    /// presence fan-out.
    pub fn others(&self, except_user: &str) -> Vec<ConnectionSender> {
        self.sessions
            .iter()
            .filter(|entry| entry.key() != except_user)
            .map(|entry| entry.value().sender.clone())
            .collect()
    }
}
