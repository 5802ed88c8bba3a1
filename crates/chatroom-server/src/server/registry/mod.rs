//! Registry of the clients currently reachable through a `Chat` stream.
//!
//! The [`SessionRegistry`] maps each username to the [`SessionSink`] of its
//! live stream. It is the single source of truth for who receives broadcasts:
//! entries are added when a session identifies itself and removed when that
//! same session ends.
//!
//! ## Concurrency
//!
//! A reader-writer lock guards the map. Broadcasts take a shared lock only
//! long enough to copy a snapshot; joins and leaves take the exclusive lock.
//! The lock is never held across an `.await`, so no send to a slow client can
//! block a registration.

mod sink;

pub use sink::{DeliveryError, Outbound, SessionSink};

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionSink>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `sink` for `username`, replacing any previous sink.
    ///
    /// The replaced sink stops receiving broadcasts but its stream is left
    /// open. Returns `true` if a previous sink was displaced.
    pub fn register(&self, username: &str, sink: SessionSink) -> bool {
        let displaced = self.sessions.write().insert(username.to_string(), sink);
        displaced.is_some()
    }

    /// Removes `username` only if it is still mapped to `sink`.
    ///
    /// A session that was replaced by a newer stream under the same name must
    /// not remove the newer entry when it tears down. Returns `true` if the
    /// entry was removed.
    pub fn unregister(&self, username: &str, sink: &SessionSink) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(username) {
            Some(current) if current.same_as(sink) => {
                sessions.remove(username);
                true
            }
            _ => false,
        }
    }

    /// Point-in-time copy of every registered session.
    pub fn snapshot_all(&self) -> Vec<(String, SessionSink)> {
        self.sessions
            .read()
            .iter()
            .map(|(username, sink)| (username.clone(), sink.clone()))
            .collect()
    }

    /// Whether `username` currently has a reachable stream.
    pub fn contains(&self, username: &str) -> bool {
        self.sessions.read().contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_replaces_previous_sink() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = SessionSink::channel(1);
        let (second, _rx2) = SessionSink::channel(1);

        assert!(!registry.register("alice", first.clone()));
        assert!(registry.register("alice", second.clone()));
        assert_eq!(registry.len(), 1);

        let snapshot = registry.snapshot_all();
        assert!(snapshot[0].1.same_as(&second));
        assert!(!snapshot[0].1.same_as(&first));
    }

    #[test]
    fn stale_unregister_keeps_newer_session() {
        let registry = SessionRegistry::new();
        let (old, _rx1) = SessionSink::channel(1);
        let (new, _rx2) = SessionSink::channel(1);

        registry.register("alice", old.clone());
        registry.register("alice", new.clone());

        // The displaced session tearing down must not evict the reconnect.
        assert!(!registry.unregister("alice", &old));
        assert!(registry.contains("alice"));

        assert!(registry.unregister("alice", &new));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = SessionRegistry::new();
        let (sink, _rx) = SessionSink::channel(1);
        assert!(!registry.unregister("ghost", &sink));
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = SessionSink::channel(1);
        let (b, _rx_b) = SessionSink::channel(1);
        registry.register("alice", a.clone());

        let snapshot = registry.snapshot_all();
        registry.register("bob", b);
        registry.unregister("alice", &a);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, "alice");
        assert_eq!(registry.snapshot_all()[0].0, "bob");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_joins_and_leaves() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();

        for i in 0..64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let (sink, _rx) = SessionSink::channel(1);
                let name = format!("user-{i}");
                registry.register(&name, sink.clone());
                let _ = registry.snapshot_all();
                if i % 2 == 0 {
                    assert!(registry.unregister(&name, &sink));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len(), 32);
        assert!(
            registry
                .snapshot_all()
                .iter()
                .all(|(name, _)| name.trim_start_matches("user-").parse::<u32>().unwrap() % 2 == 1)
        );
    }
}
