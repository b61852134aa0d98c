//! Per-chat pending email addresses.

use std::collections::HashMap;

use crate::channels::ChatId;

/// Maps each chat to the address its next message will be mailed to.
///
/// Owned by the [`Relay`](super::Relay) and only touched from its sequential
/// loop, so there is no locking. A chat has at most one pending address.
#[derive(Debug, Default)]
pub struct SessionStore {
    pending: HashMap<ChatId, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pending address for `chat`, if any.
    pub fn pending(&self, chat: ChatId) -> Option<&str> {
        self.pending.get(&chat).map(String::as_str)
    }

    /// Record `email` as pending for `chat`, replacing any previous entry.
    pub fn insert(&mut self, chat: ChatId, email: impl Into<String>) {
        self.pending.insert(chat, email.into());
    }

    /// Remove and return the pending address for `chat`.
    pub fn take(&mut self, chat: ChatId) -> Option<String> {
        self.pending.remove(&chat)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
