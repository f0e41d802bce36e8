//! Best-effort message fan-out to all Active connections.
//!
//! The broadcaster validates a message, snapshots the registry, and
//! enqueues a shared copy on every snapshot member. Per-connection
//! failures are counted, never escalated.

use crate::connection::EnqueueError;
use crate::message::ChatMessage;
use crate::registry::Registry;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Broadcast errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    /// The message failed validation and was delivered to no one.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections whose queue accepted the message.
    pub delivered: usize,
    /// Connections skipped because their queue was full or closing.
    pub skipped: usize,
}

/// Fans messages out to every Active connection in the registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver a message to every connection Active at the moment of the
    /// call.
    ///
    /// Delivery is best-effort: a full queue on one connection never
    /// aborts delivery to the rest of the snapshot. For two sequential
    /// calls, every connection present in both snapshots observes the
    /// messages in call order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` if the sender name or body is empty or
    /// over its length limit; the message is dropped without delivery.
    pub fn broadcast(&self, message: ChatMessage) -> Result<BroadcastReport, BroadcastError> {
        if let Err(reason) = message.validate() {
            warn!(reason, "Dropping invalid message");
            return Err(BroadcastError::InvalidMessage(reason));
        }

        let message = Arc::new(message);
        let snapshot = self.registry.snapshot_active();

        let mut report = BroadcastReport::default();
        for conn in &snapshot {
            match conn.enqueue(Arc::clone(&message)) {
                Ok(()) => report.delivered += 1,
                Err(EnqueueError::QueueFull) => {
                    report.skipped += 1;
                    warn!(connection = %conn.id(), "Outbound queue full, skipping delivery");
                }
            }
        }

        debug!(
            sender = %message.sender_name,
            delivered = report.delivered,
            skipped = report.skipped,
            "Broadcast complete"
        );
        Ok(report)
    }
}
