//! Database row types. These map directly to SQLite rows and stay
//! independent of the grad-types wire models.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub image: String,
    pub bio: String,
    pub created_at: String,
}

/// Author columns joined from `users`.
#[derive(Clone)]
pub struct AuthorRow {
    pub id: String,
    pub name: String,
    pub image: String,
}

pub struct MemoryRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub author: AuthorRow,
    pub likes: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CommentRow {
    pub id: String,
    pub memory_id: String,
    pub content: String,
    pub author: AuthorRow,
    pub likes: i64,
    pub created_at: String,
}

pub struct ReplyRow {
    pub id: String,
    pub comment_id: String,
    pub content: String,
    pub author: AuthorRow,
    pub likes: i64,
    pub created_at: String,
}

#[derive(Debug)]
pub struct ChatMessageRow {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_avatar: String,
    pub created_at: String,
}

/// What a like points at. Stored in `likes.target_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Memory,
    Comment,
    Reply,
}

impl LikeTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Comment => "comment",
            Self::Reply => "reply",
        }
    }
}

/// Fields of a memory at insert time.
pub struct NewMemory<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub image_url: &'a str,
    pub author_id: &'a str,
}

/// Fields of a chat message at insert time.
pub struct NewChatMessage<'a> {
    pub id: &'a str,
    pub content: &'a str,
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub sender_avatar: &'a str,
}
