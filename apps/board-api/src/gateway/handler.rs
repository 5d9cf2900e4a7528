//! Handshake authentication and client event handling.

use std::sync::Arc;

use crate::auth::tokens::TokenVerifier;
use crate::db::users::UserDirectory;
use crate::db::StoreError;

use super::events::{ClientEvent, ServerEvent, UserStoppedTyping, UserTyping};
use super::fanout::Dispatcher;
use super::registry::SessionRegistry;
use super::rooms::{self, RoomRegistry};
use super::session::{Connection, ConnectionId, Outbound, Principal};

/// Reasons a connection is refused at handshake.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("Authentication error: No token provided")]
    MissingToken,
    #[error("Authentication error: Invalid or expired token")]
    InvalidToken,
    #[error("User not found")]
    UserNotFound,
    #[error("Authentication error: User lookup failed")]
    Lookup(#[from] StoreError),
    #[error("Handshake timeout")]
    Timeout,
}

/// The realtime context: registries, dispatcher, and the collaborators the
/// handshake needs. Built once at start-up and shared.
pub struct Gateway {
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
    dispatcher: Dispatcher,
    users: Arc<dyn UserDirectory>,
    tokens: TokenVerifier,
}

impl Gateway {
    pub fn new(users: Arc<dyn UserDirectory>, tokens: TokenVerifier) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let dispatcher = Dispatcher::new(sessions.clone(), rooms.clone());
        Self {
            sessions,
            rooms,
            dispatcher,
            users,
            tokens,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Verify the bearer token and build the principal.
    ///
    /// The user lookup is the only suspension point; the caller must confirm
    /// the transport is still open before calling [`Gateway::attach`].
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthenticationError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthenticationError::MissingToken)?;

        let claims = self.tokens.verify(token).map_err(|err| {
            tracing::debug!(?err, "socket token rejected");
            AuthenticationError::InvalidToken
        })?;

        let user = self
            .users
            .find_user(&claims.user_id)
            .await?
            .ok_or(AuthenticationError::UserNotFound)?;

        Ok(Principal {
            company: user.display_company().to_string(),
            user_id: claims.user_id,
            email: claims.email,
            account_type: claims.account_type,
            role: claims.role,
        })
    }

    /// Register an authenticated connection and subscribe it to its own user
    /// room and its account-type room.
    pub fn attach(&self, principal: Principal, outbound: Outbound) -> ConnectionId {
        let connection_id = ConnectionId::generate();
        let user_room = rooms::user_room(&principal.user_id);
        let account_room = rooms::account_room(principal.account_type);
        let user_id = principal.user_id.clone();

        self.sessions.insert_connection(Arc::new(Connection::new(
            connection_id.clone(),
            principal,
            outbound,
        )));
        if let Some(previous) = self.sessions.set_session(&user_id, connection_id.clone()) {
            tracing::debug!(%user_id, previous = %previous, "session mapping replaced by reconnect");
        }
        self.rooms.join(&user_room, &connection_id);
        self.rooms.join(&account_room, &connection_id);

        tracing::info!(%user_id, connection_id = %connection_id, "socket connected");
        connection_id
    }

    /// Handle a raw text frame. Anything that does not parse is ignored.
    pub fn handle_frame(&self, connection_id: &ConnectionId, text: &str) {
        match ClientEvent::parse(text) {
            Some(event) => self.handle(connection_id, event),
            None => tracing::debug!(connection_id = %connection_id, "ignoring malformed client event"),
        }
    }

    /// Apply a client event on behalf of a live connection.
    pub fn handle(&self, connection_id: &ConnectionId, event: ClientEvent) {
        let Some(principal) = self.sessions.principal(connection_id) else {
            return;
        };

        match event {
            ClientEvent::JoinLoadRoom(load_id) => {
                self.join(connection_id, rooms::load_room, &load_id)
            }
            ClientEvent::LeaveLoadRoom(load_id) => {
                self.leave(connection_id, rooms::load_room, &load_id)
            }
            ClientEvent::JoinConversation(conversation_id) => {
                self.join(connection_id, rooms::conversation_room, &conversation_id)
            }
            ClientEvent::LeaveConversation(conversation_id) => {
                self.leave(connection_id, rooms::conversation_room, &conversation_id)
            }
            ClientEvent::TypingStart(payload) => {
                if payload.conversation_id.is_empty() {
                    return;
                }
                self.dispatcher.emit_to_room_except(
                    &rooms::conversation_room(&payload.conversation_id),
                    connection_id,
                    ServerEvent::UserTyping(UserTyping {
                        user_id: principal.user_id,
                        company: principal.company,
                    }),
                );
            }
            ClientEvent::TypingStop(payload) => {
                if payload.conversation_id.is_empty() {
                    return;
                }
                self.dispatcher.emit_to_room_except(
                    &rooms::conversation_room(&payload.conversation_id),
                    connection_id,
                    ServerEvent::UserStoppedTyping(UserStoppedTyping {
                        user_id: principal.user_id,
                    }),
                );
            }
        }
    }

    fn join(&self, connection_id: &ConnectionId, room_for: fn(&str) -> String, id: &str) {
        if id.is_empty() {
            return;
        }
        let room = room_for(id);
        if self.rooms.join(&room, connection_id) {
            tracing::debug!(connection_id = %connection_id, %room, "socket joined room");
        }
    }

    fn leave(&self, connection_id: &ConnectionId, room_for: fn(&str) -> String, id: &str) {
        if id.is_empty() {
            return;
        }
        let room = room_for(id);
        if self.rooms.leave(&room, connection_id) {
            tracing::debug!(connection_id = %connection_id, %room, "socket left room");
        }
    }

    /// Tear down a connection: leave every room and release the user mapping
    /// if it still points here. Safe to call more than once.
    pub fn detach(&self, connection_id: &ConnectionId) {
        let rooms_left = self.rooms.leave_all(connection_id);
        let Some(connection) = self.sessions.remove_connection(connection_id) else {
            return;
        };
        let user_id = &connection.principal.user_id;
        self.sessions.clear_session_if_current(user_id, connection_id);

        tracing::info!(
            %user_id,
            connection_id = %connection_id,
            rooms = rooms_left.len(),
            "socket disconnected"
        );
    }

    pub fn online_count(&self) -> usize {
        self.sessions.online_count()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.is_online(user_id)
    }

    /// Drop every connection, mapping and room. Sockets whose outbound queue
    /// is released this way close on their next poll.
    pub fn teardown(&self) {
        self.rooms.clear();
        self.sessions.clear();
        tracing::info!("gateway registries cleared");
    }
}
