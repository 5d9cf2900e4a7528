//! Room naming and membership bookkeeping. Rooms are created on first join
//! and dropped when their last member leaves.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::session::ConnectionId;
use crate::models::user::AccountType;

pub fn user_room(user_id: &str) -> String {
    format!("user_{user_id}")
}

pub fn account_room(account_type: AccountType) -> String {
    format!("account_{account_type}")
}

pub fn load_room(load_id: &str) -> String {
    format!("load_{load_id}")
}

pub fn conversation_room(conversation_id: &str) -> String {
    format!("conversation_{conversation_id}")
}

/// Conversation id for a pair of users: the smaller id first, joined by `_`.
pub fn conversation_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

#[derive(Default)]
struct RoomIndex {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    /// Reverse index for O(rooms joined) cleanup on disconnect.
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

impl RoomIndex {
    fn remove_member(&mut self, room_name: &str, connection_id: &ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room_name) else {
            return false;
        };
        let removed = members.remove(connection_id);
        if members.is_empty() {
            self.rooms.remove(room_name);
        }
        removed
    }
}

/// Room membership registry.
///
/// Both directions of the index live behind one lock so that a join, leave or
/// disconnect is observed atomically by concurrent emitters.
#[derive(Default)]
pub struct RoomRegistry {
    inner: Mutex<RoomIndex>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Idempotent. Returns `true` if the connection was not already a member.
    pub fn join(&self, room_name: &str, connection_id: &ConnectionId) -> bool {
        let mut index = self.inner.lock();
        let joined = index
            .rooms
            .entry(room_name.to_string())
            .or_default()
            .insert(connection_id.clone());
        if joined {
            index
                .memberships
                .entry(connection_id.clone())
                .or_default()
                .insert(room_name.to_string());
        }
        joined
    }

    /// Remove a connection from a room. Leaving a room you are not in is a no-op.
    pub fn leave(&self, room_name: &str, connection_id: &ConnectionId) -> bool {
        let mut index = self.inner.lock();
        let removed = index.remove_member(room_name, connection_id);
        if let Some(rooms) = index.memberships.get_mut(connection_id) {
            rooms.remove(room_name);
            if rooms.is_empty() {
                index.memberships.remove(connection_id);
            }
        }
        removed
    }

    /// Remove a connection from every room it joined. Returns the room names.
    pub fn leave_all(&self, connection_id: &ConnectionId) -> Vec<String> {
        let mut index = self.inner.lock();
        let Some(rooms) = index.memberships.remove(connection_id) else {
            return Vec::new();
        };
        for room_name in &rooms {
            index.remove_member(room_name, connection_id);
        }
        rooms.into_iter().collect()
    }

    /// Current members of a room; empty for an unknown room.
    pub fn members_of(&self, room_name: &str) -> HashSet<ConnectionId> {
        self.inner
            .lock()
            .rooms
            .get(room_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, connection_id: &ConnectionId) -> HashSet<String> {
        self.inner
            .lock()
            .memberships
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_room(&self, room_name: &str) -> bool {
        self.inner.lock().rooms.contains_key(room_name)
    }

    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// True if any room still lists this connection.
    pub fn references(&self, connection_id: &ConnectionId) -> bool {
        let index = self.inner.lock();
        index.memberships.contains_key(connection_id)
            || index
                .rooms
                .values()
                .any(|members| members.contains(connection_id))
    }

    pub fn clear(&self) {
        let mut index = self.inner.lock();
        index.rooms.clear();
        index.memberships.clear();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    #[test]
    fn room_names() {
        assert_eq!(user_room("u1"), "user_u1");
        assert_eq!(account_room(AccountType::Carrier), "account_carrier");
        assert_eq!(load_room("l9"), "load_l9");
        assert_eq!(conversation_room(&conversation_id("bob", "alice")), "conversation_alice_bob");
    }

    #[test]
    fn join_is_idempotent() {
        let rooms = RoomRegistry::new();
        assert!(rooms.join("load_1", &conn("c1")));
        assert!(!rooms.join("load_1", &conn("c1")));
        assert_eq!(rooms.members_of("load_1").len(), 1);
    }

    #[test]
    fn leave_unknown_room_is_noop() {
        let rooms = RoomRegistry::new();
        assert!(!rooms.leave("load_404", &conn("c1")));
        assert!(rooms.members_of("load_404").is_empty());
    }

    #[test]
    fn last_leave_deletes_room() {
        let rooms = RoomRegistry::new();
        rooms.join("load_1", &conn("c1"));
        rooms.join("load_1", &conn("c2"));

        rooms.leave("load_1", &conn("c1"));
        assert!(rooms.contains_room("load_1"));
        rooms.leave("load_1", &conn("c2"));
        assert!(!rooms.contains_room("load_1"));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn leave_all_removes_every_membership() {
        let rooms = RoomRegistry::new();
        rooms.join("user_u1", &conn("c1"));
        rooms.join("account_broker", &conn("c1"));
        rooms.join("account_broker", &conn("c2"));
        rooms.join("load_7", &conn("c1"));

        let mut left = rooms.leave_all(&conn("c1"));
        left.sort();
        assert_eq!(left, vec!["account_broker", "load_7", "user_u1"]);

        assert!(!rooms.references(&conn("c1")));
        assert!(!rooms.contains_room("user_u1"));
        assert!(!rooms.contains_room("load_7"));
        assert_eq!(rooms.members_of("account_broker"), HashSet::from([conn("c2")]));
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Join,
        Leave,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Join), Just(Op::Leave)]
    }

    proptest! {
        #[test]
        fn membership_matches_collapsed_sequence(ops in prop::collection::vec(op(), 0..32)) {
            let rooms = RoomRegistry::new();
            let c = conn("c1");
            for op in &ops {
                match op {
                    Op::Join => { rooms.join("load_1", &c); }
                    Op::Leave => { rooms.leave("load_1", &c); }
                }
            }

            // Collapsing repeated joins/leaves leaves only the last op relevant.
            let expected_member = matches!(ops.last(), Some(Op::Join));
            prop_assert_eq!(rooms.members_of("load_1").contains(&c), expected_member);
            prop_assert_eq!(rooms.contains_room("load_1"), expected_member);
            prop_assert_eq!(rooms.rooms_of(&c).contains("load_1"), expected_member);
        }

        #[test]
        fn conversation_room_is_commutative(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
            prop_assert_eq!(conversation_id(&a, &b), conversation_id(&b, &a));
        }
    }
}
