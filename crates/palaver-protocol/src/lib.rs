//! # palaver-protocol
//!
//! Wire protocol definitions for the Palaver chat server.
//!
//! The protocol is JSON text frames over WebSocket, one frame per text
//! message, discriminated by a `type` tag. This is the format browser
//! chat clients speak natively.
//!
//! ## Frame Types
//!
//! - `Join` / `Joined` - bind a display name to the connection
//! - `Chat` - send a message / receive the relayed broadcast
//! - `Welcome` - server greeting with connection ID and heartbeat hint
//! - `Ping` / `Pong` - keepalive
//! - `Error` - rejection with a numeric code
//!
//! ## Example
//!
//! ```rust
//! use palaver_protocol::{codec, Frame};
//!
//! let frame = Frame::chat("alice", "hello, world");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError, MAX_FRAME_SIZE};
pub use frames::{codes, Frame, PROTOCOL_VERSION};
