//! Session registry: live connections and the `user -> connection` mapping.

use std::sync::Arc;

use dashmap::DashMap;

use super::session::{Connection, ConnectionId, Principal};

/// Shared registry of live gateway connections.
///
/// At most one connection is mapped per user id. A reconnect replaces the
/// mapping without notifying the older connection, which stays live until its
/// socket closes.
#[derive(Default)]
pub struct SessionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    users: DashMap<String, ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly authenticated connection.
    pub fn insert_connection(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id.clone(), connection);
    }

    /// Stop tracking a connection. Returns it if it was live.
    pub fn remove_connection(&self, connection_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(connection_id).map(|(_, c)| c)
    }

    pub fn connection(&self, connection_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|c| c.value().clone())
    }

    pub fn is_live(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn principal(&self, connection_id: &ConnectionId) -> Option<Principal> {
        self.connections
            .get(connection_id)
            .map(|c| c.principal.clone())
    }

    /// Map a user to a connection, returning the connection it replaced.
    pub fn set_session(&self, user_id: &str, connection_id: ConnectionId) -> Option<ConnectionId> {
        self.users.insert(user_id.to_string(), connection_id)
    }

    /// Clear the user's mapping only if it still points at `connection_id`.
    ///
    /// A stale disconnect must not evict a newer reconnect.
    pub fn clear_session_if_current(&self, user_id: &str, connection_id: &ConnectionId) -> bool {
        self.users
            .remove_if(user_id, |_, current| current == connection_id)
            .is_some()
    }

    pub fn connection_for(&self, user_id: &str) -> Option<ConnectionId> {
        self.users.get(user_id).map(|c| c.value().clone())
    }

    /// Resolve a user to their connection, if that connection is still live.
    pub fn live_connection_for(&self, user_id: &str) -> Option<Arc<Connection>> {
        let connection_id = self.connection_for(user_id)?;
        self.connection(&connection_id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.live_connection_for(user_id).is_some()
    }

    /// Number of live connections.
    pub fn online_count(&self) -> usize {
        self.connections.len()
    }

    /// Drop every connection and mapping.
    pub fn clear(&self) {
        self.users.clear();
        self.connections.clear();
    }
}
