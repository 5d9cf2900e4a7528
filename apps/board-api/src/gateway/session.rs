//! Per-connection identity and outbound channel.

use std::fmt;
use std::sync::Arc;

use loadboard_common::id::{prefix, prefixed_ulid};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::events::ServerEvent;
use crate::models::user::{AccountType, Role};

/// Unique identifier for a live transport connection (`conn_` prefixed ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(prefixed_ulid(prefix::CONNECTION))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated identity attached to a connection at handshake.
///
/// Immutable for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub account_type: AccountType,
    pub role: Role,
    pub company: String,
}

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::Sender<Arc<ServerEvent>>;

/// A live, authenticated connection.
pub struct Connection {
    pub id: ConnectionId,
    pub principal: Principal,
    outbound: Outbound,
}

impl Connection {
    pub fn new(id: ConnectionId, principal: Principal, outbound: Outbound) -> Self {
        Self {
            id,
            principal,
            outbound,
        }
    }

    /// Queue an event for this connection without waiting.
    ///
    /// Returns `false` if the event was dropped (queue full or socket gone).
    pub fn deliver(&self, event: Arc<ServerEvent>) -> bool {
        match self.outbound.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %self.id,
                    user_id = %self.principal.user_id,
                    event = event.name(),
                    "outbound queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
