use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::upload::MAX_UPLOAD_BYTES;
use crate::{auth, chat, comments, countdown, memories, upload, users};

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the full HTTP surface.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/memories", get(memories::list_memories))
        .route("/api/memories/images", get(memories::memory_images))
        .route("/api/memories/{id}", get(memories::get_memory))
        .route("/api/memories/{id}/comments", get(comments::list_comments))
        .route("/api/users/{id}/memories", get(users::user_memories))
        .route("/api/chat/messages", get(chat::get_messages))
        .route("/api/chat/online", get(chat::online_users))
        .route("/api/countdown", get(countdown::get_countdown))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/auth/session", get(auth::session))
        .route("/api/users/me", get(users::me).patch(users::update_me))
        .route("/api/memories", post(memories::create_memory))
        .route("/api/memories/{id}/like", post(memories::like_memory))
        .route("/api/memories/{id}/comments", post(comments::create_comment))
        .route(
            "/api/memories/{id}/comments/{comment_id}/like",
            post(comments::like_comment),
        )
        .route(
            "/api/memories/{id}/comments/{comment_id}/reply",
            post(comments::reply_to_comment),
        )
        .route(
            "/api/memories/{id}/comments/{comment_id}/replies/{reply_id}/like",
            post(comments::like_reply),
        )
        .route("/api/chat/messages", post(chat::post_message))
        .route("/api/chat/stream", get(chat::stream))
        .route("/api/chat/socket", get(chat::socket))
        .route(
            "/api/upload",
            post(upload::upload)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + UPLOAD_OVERHEAD_BYTES)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/uploads", ServeDir::new(&state.upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
