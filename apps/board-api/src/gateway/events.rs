//! Wire-format events exchanged over the gateway socket.
//!
//! Every frame is a JSON text message `{ "event": <name>, "data": <payload> }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::load::{BillingStatus, Load, LoadStatus};

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Events a connected client may send after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinLoadRoom(String),
    LeaveLoadRoom(String),
    JoinConversation(String),
    LeaveConversation(String),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
}

impl ClientEvent {
    /// Parse a text frame. Unknown events and bad payloads yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Events pushed to clients. One variant per event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewLoad(Box<Load>),
    LoadUpdated(LoadUpdate),
    NewMessage(Value),
    MessageUpdated(Value),
    MessageDeleted(MessageDeleted),
    MessagesRead(MessagesRead),
    Notification(Value),
    UserTyping(UserTyping),
    UserStoppedTyping(UserStoppedTyping),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewLoad(_) => "new_load",
            ServerEvent::LoadUpdated(_) => "load_updated",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::MessageUpdated(_) => "message_updated",
            ServerEvent::MessageDeleted(_) => "message_deleted",
            ServerEvent::MessagesRead(_) => "messages_read",
            ServerEvent::Notification(_) => "notification",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStoppedTyping(_) => "user_stopped_typing",
        }
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Payload of `load_updated`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadUpdate {
    pub load_id: String,
    pub status: LoadStatus,
    pub booked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreed_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_status: Option<BillingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booked_at: Option<DateTime<Utc>>,
}

impl LoadUpdate {
    /// Snapshot of the booking fields of a persisted load.
    pub fn booked(load: &Load) -> Self {
        Self {
            load_id: load.id.clone(),
            status: load.status().unwrap_or(LoadStatus::Booked),
            booked_by: load.booked_by.clone(),
            agreed_rate: load.agreed_rate,
            billing_status: Some(BillingStatus::Ready),
            booked_at: load.booked_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub message_ids: Vec<String>,
    pub reader_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub user_id: String,
    pub company: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoppedTyping {
    pub user_id: String,
}
