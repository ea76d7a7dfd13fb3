//! Realtime Gateway
//!
//! Owns connected sessions and their room broadcast groups, and fans events
//! out to every live connection subscribed to a room. Each session appears at
//! most once per group, which gives at-most-once delivery per connection.
//!
//! Group membership is kept a subset of durable participant membership: the
//! only subscription paths are the connect-time auto-join (seeded from the
//! user's durable rooms), an authorized `JOIN_ROOM`, and
//! [`ChatGateway::add_users_to_room`], which is invoked right after a durable
//! participant row is created.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::messages::GatewaySend;
use super::registry::ConnectionRegistry;
use crate::infrastructure::metrics;

/// One identified session with its outbound queue and room subscriptions.
pub struct ConnectedSession {
    pub user_id: i64,
    pub session_id: String,
    /// Rooms this connection currently receives broadcasts for. Mutated only
    /// by the owning session's task and by `add_users_to_room`.
    rooms: RwLock<HashSet<i64>>,
    sender: mpsc::UnboundedSender<GatewaySend>,
}

/// Gateway managing all sessions and room broadcast groups.
pub struct ChatGateway {
    /// Active sessions by session id
    sessions: DashMap<String, Arc<ConnectedSession>>,
    /// Room id to subscribed session ids (the broadcast group)
    room_sessions: DashMap<i64, Vec<String>>,
    /// Live-connection registry, shared with the rest of the process
    registry: Arc<ConnectionRegistry>,
}

impl ChatGateway {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            sessions: DashMap::new(),
            room_sessions: DashMap::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register an identified session and its user in the registry.
    pub fn register_session(
        &self,
        session_id: &str,
        user_id: i64,
        sender: mpsc::UnboundedSender<GatewaySend>,
    ) {
        let session = Arc::new(ConnectedSession {
            user_id,
            session_id: session_id.to_string(),
            rooms: RwLock::new(HashSet::new()),
            sender,
        });

        self.sessions.insert(session_id.to_string(), session);
        self.registry.register(user_id, session_id);

        tracing::info!(user_id, session_id = %session_id, "Session registered");
    }

    /// Unconditional cleanup on disconnect: every group subscription and the
    /// registry entry go away, whatever the session was doing.
    pub fn unregister_session(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            let rooms: Vec<i64> = session.rooms.read().iter().copied().collect();
            for room_id in rooms {
                self.remove_from_group(room_id, session_id);
            }

            self.registry.unregister(session.user_id, session_id);

            tracing::info!(
                user_id = session.user_id,
                session_id = %session_id,
                "Session unregistered"
            );
        }
    }

    /// Subscribe a session to a room's broadcast group (idempotent).
    ///
    /// Never holds a `sessions` guard and a `room_sessions` guard at the same
    /// time; the two maps are always locked one at a time, in either order,
    /// by every gateway method.
    pub fn subscribe_to_room(&self, session_id: &str, room_id: i64) {
        let Some(session) = self.sessions.get(session_id).map(|s| Arc::clone(&s)) else {
            return;
        };

        let newly_added = session.rooms.write().insert(room_id);
        if newly_added {
            let mut group = self.room_sessions.entry(room_id).or_default();
            if !group.iter().any(|s| s == session_id) {
                group.push(session_id.to_string());
            }
        }
    }

    /// Remove a session from a room's broadcast group (idempotent).
    pub fn unsubscribe_from_room(&self, session_id: &str, room_id: i64) {
        if let Some(session) = self.sessions.get(session_id) {
            session.rooms.write().remove(&room_id);
        }
        self.remove_from_group(room_id, session_id);
    }

    /// Drop a session id from a group, removing the group entry once it has
    /// no members left.
    fn remove_from_group(&self, room_id: i64, session_id: &str) {
        if let Some(mut group) = self.room_sessions.get_mut(&room_id) {
            group.retain(|s| s != session_id);
        }
        self.room_sessions.remove_if(&room_id, |_, group| group.is_empty());
    }

    /// Push an event to every connection in the room's group, each exactly
    /// once, in the order the group currently lists them.
    pub fn send_to_room(&self, room_id: i64, message: GatewaySend) {
        // Snapshot the group before resolving senders so the group guard is
        // released before any `sessions` shard is locked.
        let member_ids: Vec<String> = match self.room_sessions.get(&room_id) {
            Some(group) => group.iter().cloned().collect(),
            None => return,
        };

        for session_id in &member_ids {
            if let Some(session) = self.sessions.get(session_id) {
                // A closed receiver just means the session is tearing down.
                let _ = session.sender.send(message.clone());
                if let Some(event) = &message.t {
                    metrics::GATEWAY_EVENTS_DELIVERED_TOTAL
                        .with_label_values(&[event.as_str()])
                        .inc();
                }
            }
        }
    }

    /// Push an event to a single connection.
    pub fn send_to_session(&self, session_id: &str, message: GatewaySend) -> bool {
        if let Some(session) = self.sessions.get(session_id) {
            session.sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Subscribe every live connection of the given users to a room's group.
    ///
    /// Called right after a room is created or gains a participant through a
    /// non-realtime path, so already-connected participants become reachable
    /// without waiting for a reconnect.
    pub fn add_users_to_room(&self, room_id: i64, user_ids: &[i64]) {
        for &user_id in user_ids {
            for connection_id in self.registry.connections_for(user_id) {
                self.subscribe_to_room(&connection_id, room_id);
            }
        }
    }

    /// Rooms a session is currently subscribed to.
    pub fn session_rooms(&self, session_id: &str) -> Vec<i64> {
        self.sessions
            .get(session_id)
            .map(|s| s.rooms.read().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of identified sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of connections subscribed to a room's group.
    pub fn room_group_size(&self, room_id: i64) -> usize {
        self.room_sessions
            .get(&room_id)
            .map(|g| g.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> ChatGateway {
        ChatGateway::new(Arc::new(ConnectionRegistry::new()))
    }

    fn connect(gw: &ChatGateway, session_id: &str, user_id: i64) {
        let (tx, _rx) = mpsc::unbounded_channel();
        gw.register_session(session_id, user_id, tx);
    }

    #[test]
    fn group_entry_is_dropped_when_last_member_unsubscribes() {
        let gw = gateway();
        connect(&gw, "s1", 1);
        connect(&gw, "s2", 2);
        gw.subscribe_to_room("s1", 7);
        gw.subscribe_to_room("s2", 7);

        gw.unsubscribe_from_room("s1", 7);
        assert!(gw.room_sessions.contains_key(&7));

        gw.unsubscribe_from_room("s2", 7);
        assert!(!gw.room_sessions.contains_key(&7));
    }

    #[test]
    fn group_entry_is_dropped_when_last_member_disconnects() {
        let gw = gateway();
        connect(&gw, "s1", 1);
        gw.subscribe_to_room("s1", 9);
        gw.subscribe_to_room("s1", 10);

        gw.unregister_session("s1");
        assert!(!gw.room_sessions.contains_key(&9));
        assert!(!gw.room_sessions.contains_key(&10));
        assert_eq!(gw.session_count(), 0);
    }
}
