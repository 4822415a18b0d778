use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use grad_db::models::LikeTarget;
use grad_types::api::{
    Claims, CommentListResponse, CreateCommentRequest, CreateCommentResponse,
    CreateReplyResponse, LikeResponse,
};

use crate::convert::{comment_response, path_id, reply_response};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let memory_id = path_id(&id, "Memory")?.to_string();

    let thread = state
        .db(move |db| {
            if !db.memory_exists(&memory_id)? {
                return Ok(None);
            }
            db.comments_for_memory(&memory_id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Memory"))?;

    Ok(Json(CommentListResponse {
        comments: thread
            .into_iter()
            .map(|(comment, replies)| comment_response(comment, replies))
            .collect(),
    }))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateCommentRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let memory_id = path_id(&id, "Memory")?.to_string();
    req.validate()?;

    let comment_id = Uuid::new_v4();
    let cid = comment_id.to_string();
    let author_id = claims.sub.to_string();
    let row = state
        .db(move |db| {
            if !db.memory_exists(&memory_id)? {
                return Ok(None);
            }
            db.insert_comment(&cid, &memory_id, &author_id, req.content.trim())
                .map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Memory"))?;

    info!("{} ({}) commented {} on memory {}", claims.name, claims.sub, comment_id, id);

    Ok((
        StatusCode::CREATED,
        Json(CreateCommentResponse {
            message: "Comment added successfully".into(),
            comment: comment_response(row, vec![]),
        }),
    ))
}

pub async fn like_comment(
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let memory_id = path_id(&id, "Memory")?.to_string();
    let comment_id = path_id(&comment_id, "Comment")?.to_string();
    let user_id = claims.sub.to_string();

    let (liked, likes) = state
        .db(move |db| {
            match db.get_comment(&comment_id)? {
                Some(comment) if comment.memory_id == memory_id => {}
                _ => return Ok(None),
            }
            db.toggle_like(LikeTarget::Comment, &comment_id, &user_id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;

    Ok(Json(LikeResponse { liked, likes }))
}

pub async fn reply_to_comment(
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateCommentRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let memory_id = path_id(&id, "Memory")?.to_string();
    let comment_id = path_id(&comment_id, "Comment")?.to_string();
    req.validate()?;

    let reply_id = Uuid::new_v4();
    let rid = reply_id.to_string();
    let author_id = claims.sub.to_string();
    let row = state
        .db(move |db| {
            match db.get_comment(&comment_id)? {
                Some(comment) if comment.memory_id == memory_id => {}
                _ => return Ok(None),
            }
            db.insert_reply(&rid, &comment_id, &author_id, req.content.trim())
                .map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;

    info!("{} ({}) replied {}", claims.name, claims.sub, reply_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateReplyResponse {
            message: "Reply added successfully".into(),
            reply: reply_response(row),
        }),
    ))
}

pub async fn like_reply(
    State(state): State<AppState>,
    Path((id, comment_id, reply_id)): Path<(String, String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let memory_id = path_id(&id, "Memory")?.to_string();
    let comment_id = path_id(&comment_id, "Comment")?.to_string();
    let reply_id = path_id(&reply_id, "Reply")?.to_string();
    let user_id = claims.sub.to_string();

    let (liked, likes) = state
        .db(move |db| {
            match db.get_comment(&comment_id)? {
                Some(comment) if comment.memory_id == memory_id => {}
                _ => return Ok(None),
            }
            match db.get_reply(&reply_id)? {
                Some(reply) if reply.comment_id == comment_id => {}
                _ => return Ok(None),
            }
            db.toggle_like(LikeTarget::Reply, &reply_id, &user_id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Reply"))?;

    Ok(Json(LikeResponse { liked, likes }))
}
