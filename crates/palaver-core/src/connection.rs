//! A single client's logical channel and its delivery state.
//!
//! Each connection owns a bounded outbound queue. The broadcaster appends to
//! the queue without blocking; the gateway's delivery task drains it to the
//! transport. Enqueue and close contend on the same lock, so a close racing
//! an enqueue always resolves by rejecting the enqueue.

use crate::message::ChatMessage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next process-unique connection ID.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Build a connection ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, welcome handshake not yet complete.
    Connecting,
    /// Handshake complete, eligible for broadcast delivery.
    Active,
    /// Close requested, delivery path not yet detached.
    Closing,
    /// Fully closed. Never reused.
    Closed,
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client disconnected (close frame, `leave`, or stream end).
    ClientDisconnect,
    /// The transport failed mid-session.
    TransportError,
    /// No inbound traffic within the idle window.
    IdleTimeout,
    /// The server is shutting the connection down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::ClientDisconnect => "client disconnect",
            CloseReason::TransportError => "transport error",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Rejection from [`Connection::enqueue`].
///
/// Closing and Closed connections reject with `QueueFull` as well: the
/// message has nowhere to go and the caller treats both cases identically.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// The outbound queue is at capacity (or the connection is not Active).
    #[error("outbound queue full")]
    QueueFull,
}

/// Error from [`Connection::set_display_name`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// The display name was already set for this connection.
    #[error("display name already set")]
    AlreadySet,
}

struct Inner {
    state: ConnectionState,
    queue: VecDeque<Arc<ChatMessage>>,
}

/// A single logical client channel.
pub struct Connection {
    id: ConnectionId,
    display_name: OnceLock<String>,
    capacity: usize,
    inner: Mutex<Inner>,
    outbound_ready: Notify,
}

impl Connection {
    /// Create a new connection in the Connecting state.
    #[must_use]
    pub fn new(id: ConnectionId, capacity: usize) -> Self {
        Self {
            id,
            display_name: OnceLock::new(),
            capacity,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                queue: VecDeque::new(),
            }),
            outbound_ready: Notify::new(),
        }
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Check whether the connection is Active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Get the display name, if one has been set.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.get().map(String::as_str)
    }

    /// Set the display name. Set-once; immutable for the life of the
    /// connection afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::AlreadySet`] if a name was set previously.
    pub fn set_display_name(&self, name: impl Into<String>) -> Result<(), NameError> {
        self.display_name
            .set(name.into())
            .map_err(|_| NameError::AlreadySet)
    }

    /// Append a message to the outbound queue without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::QueueFull`] if the queue is at capacity or
    /// the connection is not Active.
    pub fn enqueue(&self, message: Arc<ChatMessage>) -> Result<(), EnqueueError> {
        {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Active {
                return Err(EnqueueError::QueueFull);
            }
            if inner.queue.len() >= self.capacity {
                return Err(EnqueueError::QueueFull);
            }
            inner.queue.push_back(message);
        }
        self.outbound_ready.notify_one();
        Ok(())
    }

    /// Number of messages waiting for delivery.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Take all queued messages, in enqueue order.
    #[must_use]
    pub fn drain_pending(&self) -> Vec<Arc<ChatMessage>> {
        self.inner.lock().queue.drain(..).collect()
    }

    /// Wait until the outbound queue has work or the connection is closing.
    pub async fn wait_outbound(&self) {
        self.outbound_ready.notified().await;
    }

    /// Transition Connecting -> Active.
    ///
    /// Returns the offending state if the connection is not Connecting.
    pub(crate) fn activate(&self) -> Result<(), ConnectionState> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connecting {
            return Err(inner.state);
        }
        inner.state = ConnectionState::Active;
        Ok(())
    }

    /// Begin closing: discard queued messages and wake the delivery task.
    ///
    /// Idempotent; closing a Closing or Closed connection is a no-op.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ConnectionState::Closing | ConnectionState::Closed => return,
                ConnectionState::Connecting | ConnectionState::Active => {
                    inner.state = ConnectionState::Closing;
                    inner.queue.clear();
                }
            }
        }
        debug!(connection = %self.id, reason = %reason, "Connection closing");
        self.outbound_ready.notify_one();
    }

    /// Transition Closing -> Closed once the delivery path has detached.
    /// No-op in any other state.
    pub(crate) fn finalize(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Closing {
            inner.state = ConnectionState::Closed;
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("display_name", &self.display_name.get())
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}
