//! Frame types for the Palaver protocol.
//!
//! Frames are the messages exchanged between clients and the server, one
//! JSON object per WebSocket text message, discriminated by a `type` tag.

use serde::{Deserialize, Serialize};

/// Current protocol version, carried in the `welcome` frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Numeric error codes carried by `error` frames.
pub mod codes {
    /// The frame could not be decoded.
    pub const INVALID_FRAME: u16 = 1001;
    /// A chat message failed validation.
    pub const INVALID_MESSAGE: u16 = 1002;
    /// The connection already has a display name.
    pub const ALREADY_JOINED: u16 = 1003;
    /// The display name is empty or too long.
    pub const INVALID_NAME: u16 = 1004;
    /// The server is at its connection limit.
    pub const AT_CAPACITY: u16 = 1005;
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client registers its display name for the session.
    Join {
        /// The requested display name.
        display_name: String,
    },

    /// A chat message, client to server or relayed server to client.
    Chat {
        /// Display name of the sender.
        sender_name: String,
        /// Message text.
        body: String,
    },

    /// Client requests an orderly disconnect.
    Leave,

    /// Keepalive ping.
    Ping {
        /// Optional timestamp, echoed back in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    Pong {
        /// Echoed timestamp from the ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Server greeting, sent once immediately after accept.
    Welcome {
        /// Unique connection identifier.
        connection_id: String,
        /// Protocol version the server speaks.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat_ms: u64,
    },

    /// Acknowledges a successful `join`.
    Joined {
        /// The display name now bound to the connection.
        display_name: String,
    },

    /// Error response.
    Error {
        /// Error code (see [`codes`]).
        code: u16,
        /// Human-readable error message.
        message: String,
    },
}

impl Frame {
    /// Frame name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Join { .. } => "join",
            Frame::Chat { .. } => "chat",
            Frame::Leave => "leave",
            Frame::Ping { .. } => "ping",
            Frame::Pong { .. } => "pong",
            Frame::Welcome { .. } => "welcome",
            Frame::Joined { .. } => "joined",
            Frame::Error { .. } => "error",
        }
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(display_name: impl Into<String>) -> Self {
        Frame::Join {
            display_name: display_name.into(),
        }
    }

    /// Create a new Chat frame.
    #[must_use]
    pub fn chat(sender_name: impl Into<String>, body: impl Into<String>) -> Self {
        Frame::Chat {
            sender_name: sender_name.into(),
            body: body.into(),
        }
    }

    /// Create a new Welcome frame.
    #[must_use]
    pub fn welcome(connection_id: impl Into<String>, version: u8, heartbeat_ms: u64) -> Self {
        Frame::Welcome {
            connection_id: connection_id.into(),
            version,
            heartbeat_ms,
        }
    }

    /// Create a new Joined frame.
    #[must_use]
    pub fn joined(display_name: impl Into<String>) -> Self {
        Frame::Joined {
            display_name: display_name.into(),
        }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping(timestamp: Option<u64>) -> Self {
        Frame::Ping { timestamp }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }
}
