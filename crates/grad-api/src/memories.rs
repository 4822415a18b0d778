use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use grad_db::models::{LikeTarget, NewMemory};
use grad_types::api::{
    Claims, CreateMemoryRequest, CreateMemoryResponse, LikeResponse, MemoryDetail,
    MemoryImagesResponse, MemoryListResponse,
};

use crate::convert::{comment_response, memory_summary, path_id};
use crate::error::ApiError;
use crate::state::AppState;

/// Newest images shown on the landing carousel.
const CAROUSEL_IMAGES: u32 = 10;

/// Shown when no memory has been posted yet.
pub const DEFAULT_IMAGE: &str = "/graduation-bg.png";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

pub async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db(move |db| db.list_memories(query.limit)).await?;

    Ok(Json(MemoryListResponse {
        memories: rows.into_iter().map(memory_summary).collect(),
    }))
}

pub async fn create_memory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateMemoryRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let memory_id = Uuid::new_v4();
    let id = memory_id.to_string();
    let author_id = claims.sub.to_string();
    let row = state
        .db(move |db| {
            db.insert_memory(&NewMemory {
                id: &id,
                title: req.title.trim(),
                description: req.description.trim(),
                image_url: req.image_url.trim(),
                author_id: &author_id,
            })
        })
        .await?;

    info!("{} ({}) created memory {}", claims.name, claims.sub, memory_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateMemoryResponse {
            message: "Memory created successfully".into(),
            memory: memory_summary(row),
        }),
    ))
}

pub async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let memory_id = path_id(&id, "Memory")?.to_string();

    let found = state
        .db(move |db| {
            let Some(memory) = db.get_memory(&memory_id)? else {
                return Ok(None);
            };
            let comments = db.comments_for_memory(&memory_id)?;
            Ok(Some((memory, comments)))
        })
        .await?;

    let (memory, comments) = found.ok_or_else(|| ApiError::not_found("Memory"))?;

    Ok(Json(MemoryDetail {
        memory: memory_summary(memory),
        comments: comments
            .into_iter()
            .map(|(comment, replies)| comment_response(comment, replies))
            .collect(),
    }))
}

/// Image URLs of the newest memories. Falls back to the default background
/// when there are none, and also when the lookup fails.
pub async fn memory_images(State(state): State<AppState>) -> impl IntoResponse {
    match state.db(|db| db.latest_memory_images(CAROUSEL_IMAGES)).await {
        Ok(images) if !images.is_empty() => {
            (StatusCode::OK, Json(MemoryImagesResponse { images })).into_response()
        }
        Ok(_) => (
            StatusCode::OK,
            Json(MemoryImagesResponse {
                images: vec![DEFAULT_IMAGE.to_string()],
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Get memory images error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "message": "An error occurred while fetching memory images",
                    "images": [DEFAULT_IMAGE],
                })),
            )
                .into_response()
        }
    }
}

pub async fn like_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let memory_id = path_id(&id, "Memory")?.to_string();
    let user_id = claims.sub.to_string();

    let toggled = state
        .db(move |db| {
            if !db.memory_exists(&memory_id)? {
                return Ok(None);
            }
            db.toggle_like(LikeTarget::Memory, &memory_id, &user_id).map(Some)
        })
        .await?;

    let (liked, likes) = toggled.ok_or_else(|| ApiError::not_found("Memory"))?;
    Ok(Json(LikeResponse { liked, likes }))
}
