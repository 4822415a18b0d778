use std::path::Path;

use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use grad_types::api::{Claims, UploadResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// Largest accepted image.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Store one image from the `file` field and return its public URL.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::BadRequest("File must be an image".into()));
        }

        let ext = field
            .file_name()
            .and_then(image_extension)
            .ok_or_else(|| {
                ApiError::BadRequest("File must be a JPG, PNG, GIF or WebP image".into())
            })?;

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("No file uploaded".into()));
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(too_large());
        }

        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        tokio::fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        tokio::fs::write(state.upload_dir.join(&file_name), &data)
            .await
            .map_err(|e| {
                error!("Failed to store upload {}: {}", file_name, e);
                ApiError::Internal(e.into())
            })?;

        info!("{} uploaded {} ({} bytes)", claims.sub, file_name, data.len());

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                url: format!("/uploads/{}", file_name),
            }),
        ));
    }

    Err(ApiError::BadRequest("No file uploaded".into()))
}

/// Lowercased extension of an allowed image file name.
pub fn image_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large()
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

fn too_large() -> ApiError {
    ApiError::BadRequest("File size must be less than 16MB".into())
}
