use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ChatMessageResponse;

/// Frames pushed to chat clients over the event stream or the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    /// First frame of every connection
    Connected { user_id: Uuid },

    /// Keep-alive
    Ping,

    /// A chat message was posted
    Message(ChatMessageResponse),

    /// A user joined or left the room
    Presence {
        user_id: Uuid,
        name: String,
        online: bool,
    },

    /// A socket command was rejected; sent only to the issuing client
    Error { message: String },
}

/// Commands sent FROM client TO server over the chat socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatCommand {
    /// Join the shared room. Connections are already in the room, so this
    /// only answers with a fresh `connected` frame.
    JoinChat,

    /// Post a message to the room
    SendMessage {
        #[serde(default)]
        id: Option<String>,
        content: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SenderSnapshot;

    #[test]
    fn test_event_wire_shape() {
        let user_id = Uuid::new_v4();
        let json = serde_json::to_value(ChatEvent::Connected { user_id }).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["userId"], user_id.to_string());

        let json = serde_json::to_value(ChatEvent::Ping).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "ping" }));
    }

    #[test]
    fn test_message_event_is_flat() {
        let event = ChatEvent::Message(ChatMessageResponse {
            id: "m1".into(),
            content: "hello".into(),
            sender: SenderSnapshot {
                id: Uuid::nil(),
                name: "Ada".into(),
                avatar: String::new(),
            },
            timestamp: chrono::Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["sender"]["name"], "Ada");
    }

    #[test]
    fn test_parse_commands() {
        let cmd: ChatCommand =
            serde_json::from_str(r#"{"type":"send_message","data":{"content":"hi"}}"#).unwrap();
        match cmd {
            ChatCommand::SendMessage { id, content } => {
                assert!(id.is_none());
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cmd: ChatCommand = serde_json::from_str(r#"{"type":"join_chat"}"#).unwrap();
        assert!(matches!(cmd, ChatCommand::JoinChat));
    }
}
