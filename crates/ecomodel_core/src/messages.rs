//! Caller-owned validation message queues.
//!
//! # Responsibility
//! - Collect error and notice texts raised during validation and scripting.
//! - Track which messages a consumer has already seen.
//!
//! # Invariants
//! - Messages are append-only; reading only flips the `read` flag.

/// One queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub read: bool,
}

/// Error and notice queues with read tracking.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    errors: Vec<Message>,
    notices: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&mut self, text: impl Into<String>) {
        self.errors.push(Message {
            text: text.into(),
            read: false,
        });
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.notices.push(Message {
            text: text.into(),
            read: false,
        });
    }

    /// Returns unread error texts and marks them read.
    pub fn unread_errors(&mut self) -> Vec<String> {
        take_unread(&mut self.errors)
    }

    /// Returns unread notice texts and marks them read.
    pub fn unread_notices(&mut self) -> Vec<String> {
        take_unread(&mut self.notices)
    }

    pub fn all_errors(&self) -> &[Message] {
        &self.errors
    }

    pub fn all_notices(&self) -> &[Message] {
        &self.notices
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

fn take_unread(queue: &mut [Message]) -> Vec<String> {
    queue
        .iter_mut()
        .filter(|message| !message.read)
        .map(|message| {
            message.read = true;
            message.text.clone()
        })
        .collect()
}
