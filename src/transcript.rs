//! In-memory conversation transcript.
//!
//! Lives for the process lifetime only. A user turn and its bot reply are
//! appended under one lock, so concurrent requests never interleave inside
//! a pair.

use std::sync::Mutex;

use crate::models::Message;

#[derive(Debug, Default)]
pub struct TranscriptStore {
    messages: Mutex<Vec<Message>>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn followed by its bot reply.
    pub fn record_exchange(&self, user: Message, bot: Message) {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.push(user);
        messages.push(bot);
    }

    /// All turns, oldest first.
    pub fn list(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
