use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
};
use axum_extra::extract::WithRejection;
use futures_util::Stream;
use tracing::{info, warn};

use grad_gateway::connection::handle_connection;
use grad_gateway::room::PostError;
use grad_types::api::{
    ChatMessagesResponse, Claims, OnlineUser, OnlineUsersResponse, SendChatMessageRequest,
    SendChatMessageResponse, SenderSnapshot,
};
use grad_types::events::ChatEvent;

use crate::error::ApiError;
use crate::state::AppState;

/// Messages returned by the history endpoint.
const HISTORY_LIMIT: u32 = 50;

/// Event stream keep-alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

pub async fn get_messages(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let messages = state.room.recent(HISTORY_LIMIT).await?;
    Ok(Json(ChatMessagesResponse { messages }))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendChatMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    if req.sender.id != claims.sub {
        warn!("{} tried to post as {}", claims.sub, req.sender.id);
        return Err(ApiError::Forbidden(
            "Sender ID does not match authenticated user".into(),
        ));
    }

    let content = req.content.trim().to_string();
    let chat_message = state
        .room
        .post(req.id, content, req.sender)
        .await
        .map_err(|err| match err {
            PostError::Duplicate => ApiError::Conflict(err.to_string()),
            PostError::Internal(e) => ApiError::Internal(e),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(SendChatMessageResponse {
            message: "Message saved successfully".into(),
            chat_message,
        }),
    ))
}

/// Server-sent event stream of room activity. The connection counts as
/// online for as long as the stream is open, and the stream ends when the
/// room shuts down.
pub async fn stream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let connected = frame(&ChatEvent::Connected { user_id: claims.sub })?;
    let ping = frame(&ChatEvent::Ping)?;

    let mut membership = state.room.join(claims.sub, &claims.name);
    let closed = state.room.closed();
    info!("{} ({}) opened chat stream", claims.name, claims.sub);

    let events = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().data(connected));

        let mut heartbeat = tokio::time::interval(PING_INTERVAL);
        heartbeat.tick().await;
        tokio::pin!(closed);

        loop {
            let next = tokio::select! {
                _ = &mut closed => None,
                frame = membership.receiver().recv() => frame.map(|f| f.to_string()),
                _ = heartbeat.tick() => Some(ping.clone()),
            };
            let Some(data) = next else { break };
            yield Ok(Event::default().data(data));
        }

        info!("Chat stream for {} closed", membership.user_id());
    };

    Ok(Sse::new(events))
}

/// Upgrade to the bidirectional chat socket.
pub async fn socket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let user = state
        .db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let sender = SenderSnapshot {
        id: claims.sub,
        name: user.name,
        avatar: user.image,
    };
    let room = state.room.clone();

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, room, sender)))
}

pub async fn online_users(State(state): State<AppState>) -> impl IntoResponse {
    let mut users: Vec<OnlineUser> = state
        .room
        .presence()
        .online_users()
        .into_iter()
        .map(|(user_id, name)| OnlineUser { user_id, name })
        .collect();
    users.sort_by(|a, b| a.name.cmp(&b.name).then(a.user_id.cmp(&b.user_id)));

    Json(OnlineUsersResponse { users })
}

fn frame(event: &ChatEvent) -> Result<String, ApiError> {
    serde_json::to_string(event).map_err(|e| ApiError::Internal(e.into()))
}
