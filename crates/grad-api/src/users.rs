use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;

use grad_types::api::{Claims, MemoryListResponse, UpdateProfileRequest};

use crate::convert::{memory_summary, path_id, profile_response};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let user = state
        .db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(profile_response(user)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let id = claims.sub.to_string();
    let user = state
        .db(move |db| {
            db.update_profile(
                &id,
                req.name.as_deref().map(str::trim),
                req.image.as_deref().map(str::trim),
                req.bio.as_deref().map(str::trim),
            )
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    info!("User {} updated their profile", claims.sub);

    Ok(Json(profile_response(user)))
}

/// Memories posted by one user, newest first.
pub async fn user_memories(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = path_id(&id, "User")?.to_string();

    let rows = state
        .db(move |db| {
            if db.get_user_by_id(&user_id)?.is_none() {
                return Ok(None);
            }
            db.list_memories_by_author(&user_id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(MemoryListResponse {
        memories: rows.into_iter().map(memory_summary).collect(),
    }))
}
