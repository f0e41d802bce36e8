//! Authoritative set of live connections.
//!
//! The registry owns connection membership and lifecycle. Snapshots are
//! point-in-time copies taken under the membership lock, so joins and
//! leaves during a broadcast pass never affect that pass.

use crate::connection::{CloseReason, Connection, ConnectionId, ConnectionState};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Registry errors.
///
/// `DuplicateId`, `NotFound` and `InvalidState` indicate misuse by the
/// caller; they fail the offending operation without side effects.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A connection with this ID is already registered.
    #[error("connection {0} already registered")]
    DuplicateId(ConnectionId),

    /// No connection with this ID is registered.
    #[error("connection {0} not found")]
    NotFound(ConnectionId),

    /// The connection is not in the state the operation requires.
    #[error("connection {id} is {state:?}")]
    InvalidState {
        /// The connection in question.
        id: ConnectionId,
        /// Its state at the time of the call.
        state: ConnectionState,
    },

    /// The connection limit has been reached.
    #[error("connection limit reached ({0})")]
    AtCapacity(usize),
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of registered connections.
    pub max_connections: usize,
    /// Outbound queue capacity per connection.
    pub outbound_queue_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            outbound_queue_depth: 256,
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    /// Number of registered connections (Connecting + Active).
    pub connections: usize,
    /// Number of Active connections.
    pub active: usize,
}

/// The connection registry.
///
/// Membership is a `ConnectionId -> Connection` map behind a single
/// read-write lock. The lock is held only for membership mutation and the
/// snapshot copy, never across per-connection queue operations.
pub struct Registry {
    connections: RwLock<BTreeMap<ConnectionId, Arc<Connection>>>,
    config: RegistryConfig,
}

impl Registry {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
            config,
        }
    }

    /// Create and store a new connection in the Connecting state.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if the ID already exists (should not occur
    /// under correct transport behavior, checked defensively) or
    /// `AtCapacity` if the connection limit has been reached.
    pub fn join(&self, id: ConnectionId) -> Result<Arc<Connection>, RegistryError> {
        let mut map = self.connections.write();
        if map.contains_key(&id) {
            warn!(connection = %id, "Duplicate connection ID on join");
            return Err(RegistryError::DuplicateId(id));
        }
        if map.len() >= self.config.max_connections {
            return Err(RegistryError::AtCapacity(self.config.max_connections));
        }
        let conn = Arc::new(Connection::new(id, self.config.outbound_queue_depth));
        map.insert(id, Arc::clone(&conn));
        drop(map);

        debug!(connection = %id, "Connection joined");
        Ok(conn)
    }

    /// Transition a connection from Connecting to Active, making it
    /// visible to broadcasts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown ID or `InvalidState` if the
    /// connection is not Connecting.
    pub fn activate(&self, id: ConnectionId) -> Result<(), RegistryError> {
        let conn = self.get(id).ok_or(RegistryError::NotFound(id))?;
        conn.activate()
            .map_err(|state| RegistryError::InvalidState { id, state })?;
        debug!(connection = %id, "Connection active");
        Ok(())
    }

    /// Remove a connection and drive it to Closed.
    ///
    /// Idempotent: an absent ID is treated as already-left and returns
    /// `false`.
    pub fn leave(&self, id: ConnectionId, reason: CloseReason) -> bool {
        let removed = self.connections.write().remove(&id);
        match removed {
            Some(conn) => {
                conn.close(reason);
                conn.finalize();
                debug!(connection = %id, reason = %reason, "Connection left");
                true
            }
            None => false,
        }
    }

    /// Look up a connection by ID.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Point-in-time snapshot of all Active connections, ascending by ID.
    ///
    /// The membership lock is held only for the copy; callers operate on
    /// the snapshot after it is released.
    #[must_use]
    pub fn snapshot_active(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .values()
            .filter(|conn| conn.is_active())
            .cloned()
            .collect()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let map = self.connections.read();
        RegistryStats {
            connections: map.len(),
            active: map.values().filter(|conn| conn.is_active()).count(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_activate_leave_lifecycle() {
        let registry = Registry::new();
        let id = ConnectionId::next();

        let conn = registry.join(id).unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        // Connecting connections are invisible to broadcasts
        assert!(registry.snapshot_active().is_empty());

        registry.activate(id).unwrap();
        assert_eq!(registry.snapshot_active().len(), 1);

        assert!(registry.leave(id, CloseReason::ClientDisconnect));
        assert!(registry.snapshot_active().is_empty());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_join_duplicate_id() {
        let registry = Registry::new();
        let id = ConnectionId::next();
        let _conn = registry.join(id).unwrap();

        assert!(matches!(
            registry.join(id),
            Err(RegistryError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_join_at_capacity() {
        let registry = Registry::with_config(RegistryConfig {
            max_connections: 1,
            ..Default::default()
        });
        let _conn = registry.join(ConnectionId::next()).unwrap();

        assert!(matches!(
            registry.join(ConnectionId::next()),
            Err(RegistryError::AtCapacity(1))
        ));
    }

    #[test]
    fn test_activate_errors() {
        let registry = Registry::new();
        let id = ConnectionId::next();

        assert!(matches!(
            registry.activate(id),
            Err(RegistryError::NotFound(_))
        ));

        registry.join(id).unwrap();
        registry.activate(id).unwrap();
        assert!(matches!(
            registry.activate(id),
            Err(RegistryError::InvalidState {
                state: ConnectionState::Active,
                ..
            })
        ));
    }

    #[test]
    fn test_leave_idempotent() {
        let registry = Registry::new();
        let id = ConnectionId::next();
        registry.join(id).unwrap();

        assert!(registry.leave(id, CloseReason::ClientDisconnect));
        assert!(!registry.leave(id, CloseReason::ClientDisconnect));
        assert_eq!(registry.stats().connections, 0);
    }

    #[test]
    fn test_snapshot_order_ascending_by_id() {
        let registry = Registry::new();
        for raw in [30_000, 10_000, 20_000] {
            let id = ConnectionId::from_raw(raw);
            registry.join(id).unwrap();
            registry.activate(id).unwrap();
        }

        let ids: Vec<u64> = registry
            .snapshot_active()
            .iter()
            .map(|conn| conn.id().as_u64())
            .collect();
        assert_eq!(ids, vec![10_000, 20_000, 30_000]);
    }

    #[test]
    fn test_stats() {
        let registry = Registry::new();
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        registry.join(a).unwrap();
        registry.join(b).unwrap();
        registry.activate(a).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.active, 1);
    }
}
