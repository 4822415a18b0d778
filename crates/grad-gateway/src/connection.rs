use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use grad_types::api::{SendChatMessageRequest, SenderSnapshot};
use grad_types::events::{ChatCommand, ChatEvent};

use crate::room::{ChatRoom, PostError};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a chat socket whose user was authenticated at the HTTP upgrade.
pub async fn handle_connection(socket: WebSocket, room: ChatRoom, sender_info: SenderSnapshot) {
    let (mut sender, receiver) = socket.split();
    let user_id = sender_info.id;

    info!("{} ({}) connected to chat socket", sender_info.name, user_id);

    if send_event(&mut sender, &ChatEvent::Connected { user_id }).await.is_err() {
        return;
    }

    // Tell the newcomer who is already here before announcing it
    for (uid, name) in room.presence().online_users() {
        let event = ChatEvent::Presence {
            user_id: uid,
            name,
            online: true,
        };
        if send_event(&mut sender, &event).await.is_err() {
            return;
        }
    }

    run_connection_loop(sender, receiver, room, sender_info).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    room: ChatRoom,
    sender_info: SenderSnapshot,
) {
    let user_id = sender_info.id;
    let name = sender_info.name.clone();
    let mut membership = room.join(user_id, &name);
    let closed = room.closed();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room frames -> client, with heartbeat. Owns the membership so
    // the room is left as soon as the client stops reading.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;
        tokio::pin!(closed);

        loop {
            tokio::select! {
                _ = &mut closed => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                frame = membership.receiver().recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_room = room.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChatCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_room, &sender_info, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            sender_info.name,
                            sender_info.id,
                            e,
                            &text[..text.len().min(200)]
                        );
                        reply(&recv_room, sender_info.id, &ChatEvent::Error {
                            message: "Invalid command".into(),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from chat socket", name, user_id);
}

async fn handle_command(room: &ChatRoom, sender_info: &SenderSnapshot, cmd: ChatCommand) {
    match cmd {
        ChatCommand::JoinChat => {
            reply(room, sender_info.id, &ChatEvent::Connected {
                user_id: sender_info.id,
            });
        }

        ChatCommand::SendMessage { id, content } => {
            let req = SendChatMessageRequest {
                id,
                content,
                sender: sender_info.clone(),
                timestamp: None,
            };
            if let Err(errors) = req.validate() {
                let message = errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "Invalid message".into());
                reply(room, sender_info.id, &ChatEvent::Error { message });
                return;
            }

            match room.post(req.id, req.content, req.sender).await {
                Ok(message) => {
                    info!("{} ({}) posted chat message {}", sender_info.name, sender_info.id, message.id);
                }
                Err(PostError::Duplicate) => {
                    reply(room, sender_info.id, &ChatEvent::Error {
                        message: PostError::Duplicate.to_string(),
                    });
                }
                Err(PostError::Internal(e)) => {
                    warn!("Failed to store chat message from {}: {:#}", sender_info.id, e);
                    reply(room, sender_info.id, &ChatEvent::Error {
                        message: "Error saving chat message".into(),
                    });
                }
            }
        }
    }
}

/// Send an event to one user through the room, so it is ordered with
/// broadcast frames on the same channel.
fn reply(room: &ChatRoom, user_id: Uuid, event: &ChatEvent) {
    match serde_json::to_string(event) {
        Ok(text) => {
            room.presence().send_to(user_id, text.into());
        }
        Err(e) => warn!("Failed to serialize reply: {}", e),
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ChatEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}
