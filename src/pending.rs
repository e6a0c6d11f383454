//! Pending-call table keyed by nonce.
//!
//! Every command the engine enqueues records its callback here. A callback
//! leaves the table exactly once: on the matching response, a failed send,
//! a disconnect with the call in flight, or engine shutdown. Callbacks are
//! `FnOnce`, so a second invocation cannot be expressed.

use std::collections::HashMap;

use crate::error::{PresenceError, Result};
use crate::protocol::Message;

/// Continuation invoked with the command's outcome.
pub type Callback = Box<dyn FnOnce(Result<Message>) + Send + 'static>;

/// Outstanding commands awaiting a host response.
#[derive(Default)]
pub struct PendingCalls {
    calls: HashMap<String, Callback>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a callback for `nonce`.
    ///
    /// A nonce collision would leave the earlier call without an answer, so
    /// the displaced callback is failed right away.
    pub fn insert(&mut self, nonce: String, callback: Callback) {
        if let Some(previous) = self.calls.insert(nonce, callback) {
            previous(Err(PresenceError::Unknown(
                "nonce reused while the call was in flight".to_string(),
            )));
        }
    }

    /// Remove and return the callback for `nonce`.
    pub fn take(&mut self, nonce: &str) -> Option<Callback> {
        self.calls.remove(nonce)
    }

    /// Invoke and remove the callback for `nonce`. Returns whether one matched.
    pub fn complete(&mut self, nonce: &str, outcome: Result<Message>) -> bool {
        match self.take(nonce) {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding call with an error built by `make_error`.
    pub fn fail_all(&mut self, mut make_error: impl FnMut() -> PresenceError) -> usize {
        let count = self.calls.len();
        for (_, callback) in self.calls.drain() {
            callback(Err(make_error()));
        }
        count
    }

    /// Fail the outstanding calls whose nonce satisfies `select`.
    pub fn fail_matching(
        &mut self,
        mut select: impl FnMut(&str) -> bool,
        mut make_error: impl FnMut() -> PresenceError,
    ) -> usize {
        let chosen: Vec<String> = self
            .calls
            .keys()
            .filter(|nonce| select(nonce.as_str()))
            .cloned()
            .collect();
        for nonce in &chosen {
            if let Some(callback) = self.calls.remove(nonce) {
                callback(Err(make_error()));
            }
        }
        chosen.len()
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.calls.contains_key(nonce)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::opcode;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<std::result::Result<String, String>>>>;

    fn recorder(seen: &Seen) -> Callback {
        let seen = seen.clone();
        Box::new(move |outcome: Result<Message>| {
            let entry = match outcome {
                Ok(msg) => Ok(msg.text().to_string()),
                Err(e) => Err(e.to_string()),
            };
            seen.lock().unwrap().push(entry);
        })
    }

    fn message(nonce: &str) -> Message {
        Message {
            opcode: opcode::FRAME,
            payload: Bytes::from(format!(r#"{{"nonce":"{nonce}"}}"#)),
            nonce: Some(nonce.to_string()),
        }
    }

    #[test]
    fn test_complete_invokes_once() {
        let seen = Seen::default();
        let mut pending = PendingCalls::new();
        pending.insert("a".to_string(), recorder(&seen));

        assert!(pending.complete("a", Ok(message("a"))));
        assert!(!pending.complete("a", Ok(message("a"))));
        assert!(pending.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_nonce_is_ignored() {
        let seen = Seen::default();
        let mut pending = PendingCalls::new();
        pending.insert("a".to_string(), recorder(&seen));

        assert!(!pending.complete("b", Ok(message("b"))));
        assert!(pending.contains("a"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fail_all_drains() {
        let seen = Seen::default();
        let mut pending = PendingCalls::new();
        pending.insert("a".to_string(), recorder(&seen));
        pending.insert("b".to_string(), recorder(&seen));

        assert_eq!(pending.fail_all(|| PresenceError::ChannelNotOpen), 2);
        assert_eq!(pending.len(), 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|entry| entry.is_err()));
    }

    #[test]
    fn test_fail_matching_keeps_others() {
        let seen = Seen::default();
        let mut pending = PendingCalls::new();
        pending.insert("sent".to_string(), recorder(&seen));
        pending.insert("queued".to_string(), recorder(&seen));

        let failed = pending.fail_matching(
            |nonce| nonce != "queued",
            || PresenceError::ChannelNotOpen,
        );
        assert_eq!(failed, 1);
        assert!(pending.contains("queued"));
        assert!(!pending.contains("sent"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_collision_fails_previous() {
        let seen = Seen::default();
        let mut pending = PendingCalls::new();
        pending.insert("a".to_string(), recorder(&seen));
        pending.insert("a".to_string(), recorder(&seen));

        assert_eq!(pending.len(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].is_err());
    }
}
