use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use grad_db::Database;
use grad_db::clock::parse_timestamp;
use grad_db::models::{ChatMessageRow, NewChatMessage};
use grad_types::api::{ChatMessageResponse, SenderSnapshot};
use grad_types::events::ChatEvent;

use crate::presence::{FrameReceiver, PresenceMap, Subscription};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("A message with this id already exists")]
    Duplicate,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The shared chat room: message persistence plus fan-out to everyone
/// currently connected.
#[derive(Clone)]
pub struct ChatRoom {
    db: Arc<Database>,
    presence: PresenceMap,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ChatRoom {
    pub fn new(db: Arc<Database>, presence: PresenceMap) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            db,
            presence,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn presence(&self) -> &PresenceMap {
        &self.presence
    }

    /// Ask every open stream and socket to close, so graceful shutdown is
    /// not held up by long-lived connections.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        info!("Chat room closing {} connections", self.presence.len());
    }

    /// Resolves once [`ChatRoom::shutdown`] has been called, including
    /// calls made before this future was created.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static + use<> {
        let mut rx = self.shutdown.subscribe();
        async move {
            // Err means every room handle is gone, which is a shutdown too
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    /// Store a message and broadcast it. The server clock assigns the
    /// timestamp; `id` is generated when the client did not supply one.
    pub async fn post(
        &self,
        id: Option<String>,
        content: String,
        sender: SenderSnapshot,
    ) -> Result<ChatMessageResponse, PostError> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        // Run blocking DB insert off the async runtime
        let db = self.db.clone();
        let sender_id = sender.id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            db.insert_chat_message(&NewChatMessage {
                id: &id,
                content: &content,
                sender_id: &sender_id,
                sender_name: &sender.name,
                sender_avatar: &sender.avatar,
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?;

        let row = match result {
            Ok(row) => row,
            Err(e) if grad_db::is_unique_violation(&e) => return Err(PostError::Duplicate),
            Err(e) => return Err(PostError::Internal(e)),
        };

        let message = message_from_row(row);
        match self.presence.broadcast(&ChatEvent::Message(message.clone())) {
            Ok(delivered) => info!("Chat message {} delivered to {} listeners", message.id, delivered),
            Err(e) => warn!("Failed to serialize chat message {}: {}", message.id, e),
        }

        Ok(message)
    }

    /// The `limit` most recent messages, oldest first.
    pub async fn recent(&self, limit: u32) -> anyhow::Result<Vec<ChatMessageResponse>> {
        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || db.recent_chat_messages(limit))
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    /// Register a connection for `user_id` and announce it to the room.
    pub fn join(&self, user_id: Uuid, name: &str) -> Membership {
        let subscription = self.presence.connect(user_id, name);
        announce(&self.presence, user_id, name, true);
        Membership {
            subscription,
            presence: self.presence.clone(),
            name: name.to_string(),
        }
    }
}

fn announce(presence: &PresenceMap, user_id: Uuid, name: &str, online: bool) {
    let event = ChatEvent::Presence {
        user_id,
        name: name.to_string(),
        online,
    };
    if let Err(e) = presence.broadcast(&event) {
        warn!("Failed to serialize presence update: {}", e);
    }
}

/// A live connection to the room. Dropping it leaves the room and tells
/// everyone else, unless a newer connection of the same user took over.
pub struct Membership {
    subscription: Subscription,
    presence: PresenceMap,
    name: String,
}

impl Membership {
    pub fn user_id(&self) -> Uuid {
        self.subscription.guard.user_id()
    }

    pub fn receiver(&mut self) -> &mut FrameReceiver {
        &mut self.subscription.rx
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        let guard = &self.subscription.guard;
        if self.presence.unregister_connection(guard.user_id(), guard.conn_id()) {
            announce(&self.presence, guard.user_id(), &self.name, false);
        }
    }
}

pub fn message_from_row(row: ChatMessageRow) -> ChatMessageResponse {
    ChatMessageResponse {
        sender: SenderSnapshot {
            id: row.sender_id.parse().unwrap_or_else(|e| {
                warn!("Corrupt sender_id '{}' on chat message '{}': {}", row.sender_id, row.id, e);
                Uuid::default()
            }),
            name: row.sender_name,
            avatar: row.sender_avatar,
        },
        timestamp: parse_timestamp(&row.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on chat message '{}'", row.created_at, row.id);
            chrono::DateTime::default()
        }),
        id: row.id,
        content: row.content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with_user(user_id: Uuid) -> ChatRoom {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user_id.to_string(), "Ada", "ada@example.com", "hash")
            .unwrap();
        ChatRoom::new(Arc::new(db), PresenceMap::new())
    }

    fn sender(user_id: Uuid) -> SenderSnapshot {
        SenderSnapshot {
            id: user_id,
            name: "Ada".into(),
            avatar: String::new(),
        }
    }

    #[tokio::test]
    async fn test_post_broadcasts_to_members() {
        let user_id = Uuid::new_v4();
        let room = room_with_user(user_id);
        let mut member = room.join(Uuid::new_v4(), "listener");
        // own presence announcement
        member.receiver().recv().await.unwrap();

        let message = room
            .post(Some("m1".into()), "hello".into(), sender(user_id))
            .await
            .unwrap();
        assert_eq!(message.id, "m1");

        let frame = member.receiver().recv().await.unwrap();
        let event: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(event["type"], "message");
        assert_eq!(event["content"], "hello");

        let recent = room.recent(50).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].sender.name, "Ada");
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let user_id = Uuid::new_v4();
        let room = room_with_user(user_id);
        room.post(Some("m1".into()), "a".into(), sender(user_id)).await.unwrap();
        let err = room
            .post(Some("m1".into()), "b".into(), sender(user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::Duplicate));
    }

    #[tokio::test]
    async fn test_closed_resolves_after_shutdown() {
        let room = room_with_user(Uuid::new_v4());
        let pending = room.closed();
        room.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), pending)
            .await
            .unwrap();
        // Late subscribers see the shutdown too
        tokio::time::timeout(std::time::Duration::from_secs(1), room.clone().closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_leave_announces_offline() {
        let room = room_with_user(Uuid::new_v4());
        let mut watcher = room.join(Uuid::new_v4(), "watcher");
        watcher.receiver().recv().await.unwrap();

        let leaver_id = Uuid::new_v4();
        let leaver = room.join(leaver_id, "leaver");
        drop(leaver);

        let joined: serde_json::Value =
            serde_json::from_str(&watcher.receiver().recv().await.unwrap()).unwrap();
        let left: serde_json::Value =
            serde_json::from_str(&watcher.receiver().recv().await.unwrap()).unwrap();
        assert_eq!(joined["type"], "presence");
        assert_eq!(joined["online"], true);
        assert_eq!(left["online"], false);
        assert_eq!(left["userId"], leaver_id.to_string());
        assert!(!room.presence().contains(leaver_id));
    }
}
