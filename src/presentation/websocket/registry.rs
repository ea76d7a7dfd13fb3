//! Connection Registry
//!
//! Process-local, concurrency-safe map from user identity to the set of live
//! connection identifiers for that user. Purely in-memory: it is rebuilt from
//! scratch on process restart as clients reconnect.
//!
//! `DashMap` locks per entry, so mutations to one user's connection set never
//! contend with another user's.

use std::collections::HashSet;

use dashmap::DashMap;

/// Registry of live connections, keyed by user ID.
///
/// Created once at process start and injected wherever connection resolution
/// is needed (the gateway, tests).
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<i64, HashSet<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Record a new live connection for a user.
    pub fn register(&self, user_id: i64, connection_id: &str) {
        self.connections
            .entry(user_id)
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Remove a connection; the user's entry is dropped entirely when its
    /// last connection goes away.
    pub fn unregister(&self, user_id: i64, connection_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(&user_id) {
            entry.remove(connection_id);
            let emptied = entry.is_empty();
            drop(entry);
            if emptied {
                self.connections
                    .remove_if(&user_id, |_, conns| conns.is_empty());
            }
        }
    }

    /// Every live connection identifier for a user.
    pub fn connections_for(&self, user_id: i64) -> Vec<String> {
        self.connections
            .get(&user_id)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the user has at least one live connection.
    pub fn is_online(&self, user_id: i64) -> bool {
        self.connections
            .get(&user_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }

    /// Number of users with at least one live connection.
    pub fn online_user_count(&self) -> usize {
        self.connections.len()
    }

    /// Total number of live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_multiple_devices() {
        let registry = ConnectionRegistry::new();
        registry.register(1, "conn-a");
        registry.register(1, "conn-b");

        let mut conns = registry.connections_for(1);
        conns.sort();
        assert_eq!(conns, vec!["conn-a", "conn-b"]);
        assert!(registry.is_online(1));
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn test_entry_dropped_when_last_connection_leaves() {
        let registry = ConnectionRegistry::new();
        registry.register(1, "conn-a");
        registry.register(1, "conn-b");

        registry.unregister(1, "conn-a");
        assert!(registry.is_online(1));

        registry.unregister(1, "conn-b");
        assert!(!registry.is_online(1));
        assert_eq!(registry.online_user_count(), 0);
        assert!(registry.connections_for(1).is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_a_noop() {
        let registry = ConnectionRegistry::new();
        registry.unregister(1, "ghost");
        assert!(!registry.is_online(1));
    }

    #[test]
    fn test_duplicate_register_is_deduplicated() {
        let registry = ConnectionRegistry::new();
        registry.register(1, "conn-a");
        registry.register(1, "conn-a");
        assert_eq!(registry.connections_for(1).len(), 1);
    }
}
