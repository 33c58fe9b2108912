use dashmap::DashMap;
use std::sync::Arc;

use crate::ws::ConnectionSender;

/// Lifecycle status of a stored call record.
///
/// Declined and ended are terminal and expressed as removal from the table,
/// so only the two live states are ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ringing,
    Accepted,
}

/// One tracked call. The caller's sender is captured at initiation; the
/// recipient's only once the matching recipient accepts.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: String,
    pub caller_id: String,
    pub caller_name: String,
    pub recipient_id: String,
    pub video: bool,
    pub status: CallStatus,
    pub caller: ConnectionSender,
    pub recipient: Option<ConnectionSender>,
}

impl CallRecord {
    /// Fresh record in the initial ringing state.
    pub fn ringing(
        call_id: String,
        caller_id: String,
        caller_name: String,
        recipient_id: String,
        video: bool,
        caller: ConnectionSender,
    ) -> Self {
        Self {
            call_id,
            caller_id,
            caller_name,
            recipient_id,
            video,
            status: CallStatus::Ringing,
            caller,
            recipient: None,
        }
    }
}

/// Outcome of a terminal transition: who to notify about the ended call.
/// `other` is None when a ringing call's recipient never attached a
/// connection; the dispatcher then resolves them through the registry.
#[derive(Debug)]
pub struct EndedCall {
    pub call_id: String,
    pub other_user_id: String,
    pub other: Option<ConnectionSender>,
}

/// In-memory call table and lifecycle state machine.
///
/// Every transition is a single atomic map operation, so concurrent or late
/// transitions on the same call id serialize and exactly one takes effect.
#[derive(Debug, Clone, Default)]
pub struct CallTable {
    calls: Arc<DashMap<String, CallRecord>>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh ringing record. The dispatcher only calls this after
    /// resolving the recipient's connection through the registry.
    pub fn insert_ringing(&self, record: CallRecord) {
        self.calls.insert(record.call_id.clone(), record);
    }

    /// Roll back a just-inserted record whose invite could not be delivered.
    pub fn remove(&self, call_id: &str) {
        self.calls.remove(call_id);
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.calls.contains_key(call_id)
    }

    /// Ringing -> accepted, effective only for the matching recipient.
    /// Records the recipient's sender and returns the caller's for
    /// notification. Late or duplicate accepts are silent no-ops.
    pub fn accept(
        &self,
        call_id: &str,
        recipient_id: &str,
        sender: &ConnectionSender,
    ) -> Option<ConnectionSender> {
        let mut record = self.calls.get_mut(call_id)?;
        if record.status != CallStatus::Ringing || record.recipient_id != recipient_id {
            return None;
        }
        record.status = CallStatus::Accepted;
        record.recipient = Some(sender.clone());
        Some(record.caller.clone())
    }

    /// Ringing -> declined (terminal): the record is dropped. Returns the
    /// caller's sender. No-op unless ringing and the recipient matches.
    pub fn decline(&self, call_id: &str, recipient_id: &str) -> Option<ConnectionSender> {
        self.calls
            .remove_if(call_id, |_, record| {
                record.status == CallStatus::Ringing && record.recipient_id == recipient_id
            })
            .map(|(_, record)| record.caller)
    }

    /// Remove the record and report the party that did not request the end,
    /// determined by comparing `requester` against the stored senders.
    /// Unknown call ids are benign no-ops: whichever side ends first wins
    /// and the other side's end finds nothing.
    pub fn end(&self, call_id: &str, requester: &ConnectionSender) -> Option<EndedCall> {
        let (_, record) = self.calls.remove(call_id)?;
        Some(Self::ended_against(record, requester))
    }

    /// Disconnect cascade: remove every call in which `sender` is a stored
    /// party and report the surviving side of each exactly once.
    pub fn end_all_for_connection(&self, sender: &ConnectionSender) -> Vec<EndedCall> {
        let affected: Vec<String> = self
            .calls
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.caller.same_channel(sender)
                    || record
                        .recipient
                        .as_ref()
                        .is_some_and(|r| r.same_channel(sender))
            })
            .map(|entry| entry.key().clone())
            .collect();

        affected
            .into_iter()
            .filter_map(|call_id| self.calls.remove(&call_id))
            .map(|(_, record)| Self::ended_against(record, sender))
            .collect()
    }

    /// Companion cascade for a disconnected user who was being rung: ringing
    /// records addressed to them hold no recipient sender, so they are
    /// matched by user id instead. Only called when the dropped connection
    /// still owned the identity.
    pub fn end_ringing_for_recipient(&self, user_id: &str) -> Vec<EndedCall> {
        let affected: Vec<String> = self
            .calls
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.recipient.is_none() && record.recipient_id == user_id
            })
            .map(|entry| entry.key().clone())
            .collect();

        affected
            .into_iter()
            .filter_map(|call_id| self.calls.remove(&call_id))
            .map(|(call_id, record)| EndedCall {
                call_id,
                other_user_id: record.caller_id,
                other: Some(record.caller),
            })
            .collect()
    }

    fn ended_against(record: CallRecord, requester: &ConnectionSender) -> EndedCall {
        let (other_user_id, other) = if record.caller.same_channel(requester) {
            (record.recipient_id, record.recipient)
        } else {
            (record.caller_id, Some(record.caller))
        };
        EndedCall {
            call_id: record.call_id,
            other_user_id,
            other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CallRecord, CallTable};
    use crate::ws::ConnectionSender;
    use tokio::sync::mpsc;

    fn sender() -> ConnectionSender {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    fn ringing(table: &CallTable, call_id: &str, caller: &ConnectionSender) {
        table.insert_ringing(CallRecord::ringing(
            call_id.to_string(),
            "alice".to_string(),
            "Alice".to_string(),
            "bob".to_string(),
            false,
            caller.clone(),
        ));
    }

    #[test]
    fn accept_is_effective_exactly_once() {
        let table = CallTable::new();
        let caller = sender();
        let recipient = sender();
        ringing(&table, "c1", &caller);

        let notified = table.accept("c1", "bob", &recipient);
        assert!(notified.is_some_and(|tx| tx.same_channel(&caller)));

        // Duplicate accept, and accept from the wrong user, are no-ops.
        assert!(table.accept("c1", "bob", &recipient).is_none());
        assert!(table.accept("c1", "mallory", &recipient).is_none());
    }

    #[test]
    fn accept_requires_matching_recipient() {
        let table = CallTable::new();
        ringing(&table, "c1", &sender());

        assert!(table.accept("c1", "mallory", &sender()).is_none());
        assert!(table.contains("c1"));
    }

    #[test]
    fn decline_removes_the_record() {
        let table = CallTable::new();
        let caller = sender();
        ringing(&table, "c1", &caller);

        let notified = table.decline("c1", "bob");
        assert!(notified.is_some_and(|tx| tx.same_channel(&caller)));
        assert!(!table.contains("c1"));

        // Everything after a terminal transition is a no-op.
        assert!(table.decline("c1", "bob").is_none());
        assert!(table.accept("c1", "bob", &sender()).is_none());
        assert!(table.end("c1", &sender()).is_none());
    }

    #[test]
    fn first_end_wins_and_reports_the_other_party() {
        let table = CallTable::new();
        let caller = sender();
        let recipient = sender();
        ringing(&table, "c1", &caller);
        table.accept("c1", "bob", &recipient);

        let ended = table.end("c1", &recipient).unwrap();
        assert_eq!(ended.other_user_id, "alice");
        assert!(ended.other.unwrap().same_channel(&caller));

        // The loser of the race finds the record already gone.
        assert!(table.end("c1", &caller).is_none());
    }

    #[test]
    fn end_while_ringing_reports_recipient_without_sender() {
        let table = CallTable::new();
        let caller = sender();
        ringing(&table, "c1", &caller);

        let ended = table.end("c1", &caller).unwrap();
        assert_eq!(ended.other_user_id, "bob");
        assert!(ended.other.is_none());
    }

    #[test]
    fn disconnect_cascade_ends_every_call_of_the_connection() {
        let table = CallTable::new();
        let caller = sender();
        let recipient = sender();
        ringing(&table, "c1", &caller);
        table.accept("c1", "bob", &recipient);
        ringing(&table, "c2", &caller);

        let ended = table.end_all_for_connection(&caller);
        assert_eq!(ended.len(), 2);
        assert!(!table.contains("c1"));
        assert!(!table.contains("c2"));
        assert!(ended.iter().all(|e| e.other_user_id == "bob"));
    }

    #[test]
    fn ringing_recipient_disconnect_is_matched_by_user_id() {
        let table = CallTable::new();
        let caller = sender();
        ringing(&table, "c1", &caller);

        // The recipient never accepted, so their connection is not stored.
        assert!(table.end_all_for_connection(&sender()).is_empty());

        let ended = table.end_ringing_for_recipient("bob");
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].other_user_id, "alice");
        assert!(ended[0].other.as_ref().unwrap().same_channel(&caller));
        assert!(!table.contains("c1"));
    }
}
