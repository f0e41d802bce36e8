//! Chat message types.
//!
//! Messages are immutable once constructed and carry no identity beyond
//! value equality; duplicates are permitted.

use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum sender/display name length in bytes.
pub const MAX_NAME_LENGTH: usize = 80;

/// Maximum message body length in bytes.
pub const MAX_BODY_LENGTH: usize = 4096;

/// A chat message to be fanned out to connected clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Display name of the sender.
    pub sender_name: String,
    /// Message text.
    pub body: String,
    /// Unix timestamp (milliseconds) when the server received the message.
    pub received_at: u64,
}

impl ChatMessage {
    /// Create a new message, stamped with the current time.
    #[must_use]
    pub fn new(sender_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender_name: sender_name.into(),
            body: body.into(),
            received_at: unix_millis(),
        }
    }

    /// Validate the message for broadcast.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the sender name or body
    /// is empty or exceeds its length limit.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.sender_name.is_empty() {
            return Err("sender name cannot be empty");
        }
        if self.sender_name.len() > MAX_NAME_LENGTH {
            return Err("sender name too long");
        }
        if self.body.is_empty() {
            return Err("message body cannot be empty");
        }
        if self.body.len() > MAX_BODY_LENGTH {
            return Err("message body too long");
        }
        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
