//! Row -> wire conversions. Corrupt stored values are logged and replaced
//! with defaults rather than failing the whole response.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use grad_db::clock::parse_timestamp;
use grad_db::models::{AuthorRow, CommentRow, MemoryRow, ReplyRow, UserRow};
use grad_types::api::{
    AuthorSummary, CommentResponse, MemorySummary, ProfileResponse, ReplyResponse,
};

use crate::error::ApiError;

/// Parse an id taken from the URL. Anything that is not a valid id cannot
/// name an existing document, so it is reported as not found.
pub fn path_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found(what))
}

pub fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn parse_time(raw: &str, what: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt {} '{}'", what, raw);
        DateTime::default()
    })
}

pub fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

pub fn author_summary(author: AuthorRow) -> AuthorSummary {
    AuthorSummary {
        id: parse_uuid(&author.id, "author id"),
        name: author.name,
        image: non_empty(author.image),
    }
}

pub fn memory_summary(row: MemoryRow) -> MemorySummary {
    MemorySummary {
        id: parse_uuid(&row.id, "memory id"),
        created_at: parse_time(&row.created_at, "memory created_at"),
        updated_at: parse_time(&row.updated_at, "memory updated_at"),
        title: row.title,
        description: row.description,
        image_url: row.image_url,
        author: author_summary(row.author),
        likes: row.likes,
        comment_count: row.comment_count,
    }
}

pub fn reply_response(row: ReplyRow) -> ReplyResponse {
    ReplyResponse {
        id: parse_uuid(&row.id, "reply id"),
        created_at: parse_time(&row.created_at, "reply created_at"),
        content: row.content,
        author: author_summary(row.author),
        likes: row.likes,
    }
}

pub fn comment_response(row: CommentRow, replies: Vec<ReplyRow>) -> CommentResponse {
    CommentResponse {
        id: parse_uuid(&row.id, "comment id"),
        created_at: parse_time(&row.created_at, "comment created_at"),
        content: row.content,
        author: author_summary(row.author),
        likes: row.likes,
        replies: replies.into_iter().map(reply_response).collect(),
    }
}

pub fn profile_response(row: UserRow) -> ProfileResponse {
    ProfileResponse {
        id: parse_uuid(&row.id, "user id"),
        created_at: parse_time(&row.created_at, "user created_at"),
        name: row.name,
        email: row.email,
        image: non_empty(row.image),
        bio: row.bio,
    }
}
