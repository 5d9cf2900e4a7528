//! Event fan-out to rooms and individual users.
//!
//! Delivery is fire-and-forget: membership is resolved at call time, each live
//! member gets the event queued on its outbound channel, and anything that
//! cannot be delivered is dropped. Nothing here returns an error.

use std::sync::Arc;

use serde_json::Value;

use super::events::{LoadUpdate, MessageDeleted, MessagesRead, ServerEvent};
use super::registry::SessionRegistry;
use super::rooms::{self, load_room};
use super::session::ConnectionId;
use crate::models::load::Load;
use crate::models::user::AccountType;

/// Cloneable handle for emitting events. Store it wherever events originate.
#[derive(Clone)]
pub struct Dispatcher {
    sessions: Arc<SessionRegistry>,
    rooms: Arc<rooms::RoomRegistry>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionRegistry>, rooms: Arc<rooms::RoomRegistry>) -> Self {
        Self { sessions, rooms }
    }

    /// Deliver to every current member of a room. Returns the number of
    /// connections the event was queued for.
    pub fn emit_to_room(&self, room_name: &str, event: ServerEvent) -> usize {
        self.fan_out(room_name, None, event)
    }

    /// Deliver to every current member of a room except one connection.
    pub fn emit_to_room_except(
        &self,
        room_name: &str,
        except: &ConnectionId,
        event: ServerEvent,
    ) -> usize {
        self.fan_out(room_name, Some(except), event)
    }

    /// Deliver to the user's mapped connection, if it is live. Otherwise the
    /// event is dropped.
    pub fn emit_to_user(&self, user_id: &str, event: ServerEvent) -> bool {
        let Some(connection) = self.sessions.live_connection_for(user_id) else {
            tracing::debug!(%user_id, event = event.name(), "user offline, event dropped");
            return false;
        };
        let name = event.name();
        let delivered = connection.deliver(Arc::new(event));
        tracing::debug!(%user_id, connection_id = %connection.id, event = name, delivered, "emitted to user");
        delivered
    }

    fn fan_out(&self, room_name: &str, except: Option<&ConnectionId>, event: ServerEvent) -> usize {
        let name = event.name();
        let event = Arc::new(event);
        let mut members: Vec<ConnectionId> = self.rooms.members_of(room_name).into_iter().collect();
        members.sort();

        let delivered = members
            .iter()
            .filter(|id| Some(*id) != except)
            .filter_map(|id| self.sessions.connection(id))
            .filter(|connection| connection.deliver(event.clone()))
            .count();

        tracing::debug!(room = %room_name, event = name, delivered, "emitted to room");
        delivered
    }

    // -----------------------------------------------------------------------
    // Broadcast contracts
    // -----------------------------------------------------------------------

    /// A load was posted: every carrier and broker hears about it.
    pub fn notify_new_load(&self, load: &Load) {
        let event = ServerEvent::NewLoad(Box::new(load.clone()));
        for account_type in [AccountType::Carrier, AccountType::Broker] {
            self.emit_to_room(&rooms::account_room(account_type), event.clone());
        }
        tracing::info!(load_id = %load.id, "notified new load");
    }

    /// A load changed state: only watchers of that load are told.
    pub fn notify_load_updated(&self, update: LoadUpdate) {
        let room = load_room(&update.load_id);
        self.emit_to_room(&room, ServerEvent::LoadUpdated(update));
    }

    /// New message, delivered to sender and receiver directly since either may
    /// not have joined the conversation room yet.
    pub fn notify_new_message(&self, sender_id: &str, receiver_id: &str, mut message: Value) {
        if let Value::Object(fields) = &mut message {
            fields
                .entry("conversationId")
                .or_insert_with(|| Value::String(rooms::conversation_id(sender_id, receiver_id)));
        }
        self.emit_to_participants(sender_id, receiver_id, ServerEvent::NewMessage(message));
    }

    pub fn notify_message_updated(&self, sender_id: &str, receiver_id: &str, message: Value) {
        self.emit_to_participants(sender_id, receiver_id, ServerEvent::MessageUpdated(message));
    }

    pub fn notify_message_deleted(&self, sender_id: &str, receiver_id: &str, message_id: &str) {
        let event = ServerEvent::MessageDeleted(MessageDeleted {
            message_id: message_id.to_string(),
            conversation_id: Some(rooms::conversation_id(sender_id, receiver_id)),
        });
        self.emit_to_participants(sender_id, receiver_id, event);
    }

    /// Read receipts go to the conversation room so the other participant can
    /// update without refetching.
    pub fn notify_messages_read(&self, conversation_id: &str, message_ids: Vec<String>, reader_id: &str) {
        let event = ServerEvent::MessagesRead(MessagesRead {
            message_ids,
            reader_id: reader_id.to_string(),
        });
        self.emit_to_room(&rooms::conversation_room(conversation_id), event);
    }

    pub fn notify_user(&self, user_id: &str, notification: Value) {
        self.emit_to_user(user_id, ServerEvent::Notification(notification));
    }

    fn emit_to_participants(&self, sender_id: &str, receiver_id: &str, event: ServerEvent) {
        self.emit_to_user(sender_id, event.clone());
        if receiver_id != sender_id {
            self.emit_to_user(receiver_id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::gateway::rooms::RoomRegistry;
    use crate::gateway::session::{Connection, Principal};
    use crate::models::user::Role;

    struct Harness {
        sessions: Arc<SessionRegistry>,
        rooms: Arc<RoomRegistry>,
        dispatcher: Dispatcher,
    }

    impl Harness {
        fn new() -> Self {
            let sessions = Arc::new(SessionRegistry::new());
            let rooms = Arc::new(RoomRegistry::new());
            let dispatcher = Dispatcher::new(sessions.clone(), rooms.clone());
            Self {
                sessions,
                rooms,
                dispatcher,
            }
        }

        fn connect(&self, conn_id: &str, user_id: &str) -> mpsc::Receiver<Arc<ServerEvent>> {
            let (tx, rx) = mpsc::channel(16);
            let principal = Principal {
                user_id: user_id.to_string(),
                email: format!("{user_id}@example.com"),
                account_type: AccountType::Carrier,
                role: Role::User,
                company: format!("{user_id} Trucking"),
            };
            let id = ConnectionId::from(conn_id);
            self.sessions
                .insert_connection(Arc::new(Connection::new(id.clone(), principal, tx)));
            self.sessions.set_session(user_id, id);
            rx
        }

        fn disconnect(&self, conn_id: &str, user_id: &str) {
            let id = ConnectionId::from(conn_id);
            self.rooms.leave_all(&id);
            self.sessions.remove_connection(&id);
            self.sessions.clear_session_if_current(user_id, &id);
        }
    }

    fn names(rx: &mut mpsc::Receiver<Arc<ServerEvent>>) -> Vec<&'static str> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.name());
        }
        out
    }

    #[test]
    fn emit_to_room_reaches_current_members_only() {
        let h = Harness::new();
        let mut a = h.connect("c1", "u1");
        let mut b = h.connect("c2", "u2");
        h.rooms.join("load_1", &ConnectionId::from("c1"));

        let delivered = h.dispatcher.emit_to_room(
            "load_1",
            ServerEvent::Notification(serde_json::json!({ "n": 1 })),
        );
        assert_eq!(delivered, 1);
        assert_eq!(names(&mut a), vec!["notification"]);
        assert!(names(&mut b).is_empty());
    }

    #[test]
    fn emit_to_unknown_room_is_noop() {
        let h = Harness::new();
        assert_eq!(
            h.dispatcher
                .emit_to_room("load_404", ServerEvent::Notification(Value::Null)),
            0
        );
    }

    #[test]
    fn emit_except_skips_sender() {
        let h = Harness::new();
        let mut a = h.connect("c1", "u1");
        let mut b = h.connect("c2", "u2");
        for c in ["c1", "c2"] {
            h.rooms
                .join("conversation_u1_u2", &ConnectionId::from(c));
        }

        h.dispatcher.emit_to_room_except(
            "conversation_u1_u2",
            &ConnectionId::from("c1"),
            ServerEvent::Notification(Value::Null),
        );
        assert!(names(&mut a).is_empty());
        assert_eq!(names(&mut b), vec!["notification"]);
    }

    #[test]
    fn emit_to_user_after_disconnect_is_noop() {
        let h = Harness::new();
        let rx = h.connect("c1", "u1");
        h.disconnect("c1", "u1");
        drop(rx);

        assert!(!h.dispatcher.emit_to_user("u1", ServerEvent::Notification(Value::Null)));
        assert!(!h.dispatcher.emit_to_user("never", ServerEvent::Notification(Value::Null)));
    }

    #[test]
    fn emit_to_user_with_closed_socket_is_swallowed() {
        let h = Harness::new();
        let rx = h.connect("c1", "u1");
        drop(rx);
        assert!(!h.dispatcher.emit_to_user("u1", ServerEvent::Notification(Value::Null)));
    }

    #[test]
    fn room_events_keep_issue_order() {
        let h = Harness::new();
        let mut a = h.connect("c1", "u1");
        h.rooms.join("load_1", &ConnectionId::from("c1"));

        for i in 0..5 {
            h.dispatcher
                .emit_to_room("load_1", ServerEvent::Notification(serde_json::json!(i)));
        }
        let mut seen = Vec::new();
        while let Ok(event) = a.try_recv() {
            if let ServerEvent::Notification(v) = event.as_ref() {
                seen.push(v.as_i64().unwrap());
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn new_message_goes_to_both_participants_with_conversation_id() {
        let h = Harness::new();
        let mut a = h.connect("c1", "u2");
        let mut b = h.connect("c2", "u1");

        h.dispatcher
            .notify_new_message("u2", "u1", serde_json::json!({ "_id": "msg_1", "content": "hi" }));

        for rx in [&mut a, &mut b] {
            let event = rx.try_recv().unwrap();
            match event.as_ref() {
                ServerEvent::NewMessage(doc) => assert_eq!(doc["conversationId"], "u1_u2"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn message_deleted_reaches_online_participant_only() {
        let h = Harness::new();
        let mut a = h.connect("c1", "u1");

        h.dispatcher.notify_message_deleted("u1", "offline", "msg_9");
        assert_eq!(names(&mut a), vec!["message_deleted"]);
    }

    #[test]
    fn messages_read_uses_conversation_room() {
        let h = Harness::new();
        let mut a = h.connect("c1", "u1");
        let mut b = h.connect("c2", "u2");
        h.rooms
            .join("conversation_u1_u2", &ConnectionId::from("c1"));

        h.dispatcher
            .notify_messages_read("u1_u2", vec!["msg_1".into()], "u2");
        assert_eq!(names(&mut a), vec!["messages_read"]);
        assert!(names(&mut b).is_empty());
    }
}
