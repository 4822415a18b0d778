use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A serialized frame, shared between every receiver of a broadcast.
pub type Frame = Arc<str>;

pub type FrameSender = mpsc::UnboundedSender<Frame>;
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

/// Identifies one registration, so a stale connection cannot evict the
/// connection that replaced it.
pub type ConnectionId = Uuid;

struct Entry {
    conn_id: ConnectionId,
    name: String,
    tx: FrameSender,
}

/// Process-wide map from connected user to its open output channel.
///
/// One entry per user; registering again replaces the previous channel.
/// Holds no backlog: a user that is not registered when a broadcast happens
/// never sees that frame.
#[derive(Clone, Default)]
pub struct PresenceMap {
    inner: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or overwrite) the channel for `user_id`.
    pub fn register(&self, user_id: Uuid, name: impl Into<String>, tx: FrameSender) -> ConnectionId {
        let conn_id = Uuid::new_v4();
        let replaced = self.write().insert(
            user_id,
            Entry {
                conn_id,
                name: name.into(),
                tx,
            },
        );
        if replaced.is_some() {
            debug!("User {} re-registered, previous channel replaced", user_id);
        }
        conn_id
    }

    /// Create a channel for `user_id`, register it, and hand back the
    /// receiving side. Dropping the subscription unregisters it.
    pub fn connect(&self, user_id: Uuid, name: impl Into<String>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = self.register(user_id, name, tx);
        Subscription {
            rx,
            guard: ConnectionGuard {
                presence: self.clone(),
                user_id,
                conn_id,
            },
        }
    }

    /// Remove the entry for `user_id`. Idempotent; returns whether an entry
    /// was present.
    pub fn unregister(&self, user_id: Uuid) -> bool {
        self.write().remove(&user_id).is_some()
    }

    /// Remove the entry only if it still belongs to `conn_id`.
    pub fn unregister_connection(&self, user_id: Uuid, conn_id: ConnectionId) -> bool {
        let mut map = self.write();
        match map.get(&user_id) {
            Some(entry) if entry.conn_id == conn_id => {
                map.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Serialize `event` once and push it to every registered channel.
    ///
    /// A channel whose receiver is gone is removed and the fan-out continues
    /// with the rest. Returns how many channels accepted the frame.
    pub fn broadcast<T: Serialize + ?Sized>(&self, event: &T) -> Result<usize, serde_json::Error> {
        let frame: Frame = serde_json::to_string(event)?.into();
        Ok(self.broadcast_frame(&frame))
    }

    /// Push an already serialized frame to every registered channel.
    pub fn broadcast_frame(&self, frame: &Frame) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;

        {
            let map = self.read();
            for (user_id, entry) in map.iter() {
                if entry.tx.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push((*user_id, entry.conn_id));
                }
            }
        }

        for (user_id, conn_id) in dead {
            if self.unregister_connection(user_id, conn_id) {
                warn!("Dropped dead chat channel for user {}", user_id);
            }
        }

        delivered
    }

    /// Send a frame to one user only. Returns false when the user is not
    /// registered or its channel is dead; a dead entry is removed.
    pub fn send_to(&self, user_id: Uuid, frame: Frame) -> bool {
        let conn_id = {
            let map = self.read();
            let Some(entry) = map.get(&user_id) else {
                return false;
            };
            if entry.tx.send(frame).is_ok() {
                return true;
            }
            entry.conn_id
        };
        self.unregister_connection(user_id, conn_id);
        false
    }

    /// Currently registered users with their display names.
    pub fn online_users(&self) -> Vec<(Uuid, String)> {
        self.read()
            .iter()
            .map(|(id, entry)| (*id, entry.name.clone()))
            .collect()
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.read().contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave an entry half-written,
    // so a poisoned map is still usable.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Entry>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Entry>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving side of a registration made with [`PresenceMap::connect`].
pub struct Subscription {
    pub rx: FrameReceiver,
    pub guard: ConnectionGuard,
}

/// Unregisters its connection on drop, unless a newer one took over.
pub struct ConnectionGuard {
    presence: PresenceMap,
    user_id: Uuid,
    conn_id: ConnectionId,
}

impl ConnectionGuard {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Whether this connection still owns the user's entry.
    pub fn is_current(&self) -> bool {
        self.presence
            .read()
            .get(&self.user_id)
            .is_some_and(|entry| entry.conn_id == self.conn_id)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.presence.unregister_connection(self.user_id, self.conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_reaches_every_channel() {
        let presence = PresenceMap::new();
        let mut a = presence.connect(Uuid::new_v4(), "a");
        let mut b = presence.connect(Uuid::new_v4(), "b");

        let delivered = presence.broadcast(&json!({ "type": "ping" })).unwrap();
        assert_eq!(delivered, 2);

        let fa = a.rx.try_recv().unwrap();
        let fb = b.rx.try_recv().unwrap();
        assert_eq!(&*fa, r#"{"type":"ping"}"#);
        // Serialized once, shared by all receivers
        assert!(Arc::ptr_eq(&fa, &fb));
    }

    #[test]
    fn test_dead_channel_dropped_without_error() {
        let presence = PresenceMap::new();
        let alive_id = Uuid::new_v4();
        let dead_id = Uuid::new_v4();

        let mut alive = presence.connect(alive_id, "alive");
        let (tx, rx) = mpsc::unbounded_channel();
        presence.register(dead_id, "dead", tx);
        drop(rx);

        let delivered = presence.broadcast(&json!({ "n": 1 })).unwrap();
        assert_eq!(delivered, 1);
        assert!(alive.rx.try_recv().is_ok());
        assert!(presence.contains(alive_id));
        assert!(!presence.contains(dead_id));

        // Later broadcasts keep working for the survivors
        assert_eq!(presence.broadcast(&json!({ "n": 2 })).unwrap(), 1);
    }

    #[test]
    fn test_register_overwrites() {
        let presence = PresenceMap::new();
        let user = Uuid::new_v4();
        let mut first = presence.connect(user, "first");
        let mut second = presence.connect(user, "second");
        assert_eq!(presence.len(), 1);

        presence.broadcast(&json!("hi")).unwrap();
        assert!(first.rx.try_recv().is_err());
        assert!(second.rx.try_recv().is_ok());
        assert!(!first.guard.is_current());
        assert!(second.guard.is_current());

        // The replaced connection going away must not evict the new one
        drop(first);
        assert!(presence.contains(user));
        assert_eq!(presence.online_users(), vec![(user, "second".to_string())]);

        drop(second);
        assert!(presence.is_empty());
    }

    #[test]
    fn test_unregister_idempotent() {
        let presence = PresenceMap::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        presence.register(user, "u", tx);

        assert!(presence.unregister(user));
        assert!(!presence.unregister(user));
        assert!(presence.is_empty());
    }

    #[test]
    fn test_broadcast_with_no_listeners() {
        let presence = PresenceMap::new();
        assert_eq!(presence.broadcast(&json!({})).unwrap(), 0);
    }

    #[test]
    fn test_send_to() {
        let presence = PresenceMap::new();
        let user = Uuid::new_v4();
        let mut sub = presence.connect(user, "u");

        assert!(presence.send_to(user, Arc::from("only you")));
        assert_eq!(&*sub.rx.try_recv().unwrap(), "only you");
        assert!(!presence.send_to(Uuid::new_v4(), Arc::from("nobody")));

        sub.rx.close();
        assert!(!presence.send_to(user, Arc::from("closed")));
        assert!(!presence.contains(user));
    }
}
