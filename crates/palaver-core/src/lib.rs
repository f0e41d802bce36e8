//! # palaver-core
//!
//! Connection registry and broadcast core for the Palaver chat server.
//!
//! This crate provides the reusable fan-out primitive:
//!
//! - **Connection** - a single client channel with a bounded outbound queue
//! - **Registry** - authoritative set of live connections
//! - **Broadcaster** - best-effort message fan-out over registry snapshots
//! - **ChatMessage** - the immutable message value
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Gateway   │────▶│ Broadcaster │────▶│  Registry   │
//! └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                │ snapshot
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │ Connection  │ (outbound queue)
//!                                         └─────────────┘
//! ```
//!
//! Broadcasts enumerate a point-in-time snapshot of Active connections and
//! enqueue without blocking; a slow client's full queue is skipped, never
//! waited on.

pub mod broadcast;
pub mod connection;
pub mod message;
pub mod registry;

pub use broadcast::{BroadcastError, BroadcastReport, Broadcaster};
pub use connection::{
    CloseReason, Connection, ConnectionId, ConnectionState, EnqueueError, NameError,
};
pub use message::{ChatMessage, MAX_BODY_LENGTH, MAX_NAME_LENGTH};
pub use registry::{Registry, RegistryConfig, RegistryError, RegistryStats};
