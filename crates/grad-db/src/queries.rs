use crate::Database;
use crate::models::{
    AuthorRow, ChatMessageRow, CommentRow, LikeTarget, MemoryRow, NewChatMessage, NewMemory,
    ReplyRow, UserRow,
};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, name, email, password, image, bio, created_at";

const MEMORY_SELECT: &str = "
    SELECT m.id, m.title, m.description, m.image_url,
           m.author_id, COALESCE(u.name, 'unknown'), COALESCE(u.image, ''),
           (SELECT COUNT(*) FROM likes l WHERE l.target_kind = 'memory' AND l.target_id = m.id),
           (SELECT COUNT(*) FROM comments c WHERE c.memory_id = m.id),
           m.created_at, m.updated_at
    FROM memories m
    LEFT JOIN users u ON m.author_id = u.id";

const COMMENT_SELECT: &str = "
    SELECT c.id, c.memory_id, c.content,
           c.author_id, COALESCE(u.name, 'unknown'), COALESCE(u.image, ''),
           (SELECT COUNT(*) FROM likes l WHERE l.target_kind = 'comment' AND l.target_id = c.id),
           c.created_at
    FROM comments c
    LEFT JOIN users u ON c.author_id = u.id";

const REPLY_SELECT: &str = "
    SELECT r.id, r.comment_id, r.content,
           r.author_id, COALESCE(u.name, 'unknown'), COALESCE(u.image, ''),
           (SELECT COUNT(*) FROM likes l WHERE l.target_kind = 'reply' AND l.target_id = r.id),
           r.created_at
    FROM replies r
    LEFT JOIN users u ON r.author_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, name: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            let now = self.next_timestamp();
            conn.execute(
                "INSERT INTO users (id, name, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id, name, email, password_hash, now],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Update the given profile fields, leaving `None` ones untouched.
    /// Returns `None` when the user does not exist.
    pub fn update_profile(
        &self,
        id: &str,
        name: Option<&str>,
        image: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let now = self.next_timestamp();
            let changed = conn.execute(
                "UPDATE users
                 SET name = COALESCE(?2, name),
                     image = COALESCE(?3, image),
                     bio = COALESCE(?4, bio),
                     updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id, name, image, bio, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, "id", id)
        })
    }

    // -- Memories --

    pub fn insert_memory(&self, memory: &NewMemory<'_>) -> Result<MemoryRow> {
        self.with_conn(|conn| {
            let now = self.next_timestamp();
            conn.execute(
                "INSERT INTO memories (id, title, description, image_url, author_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    memory.id,
                    memory.title,
                    memory.description,
                    memory.image_url,
                    memory.author_id,
                    now
                ],
            )?;
            query_memory(conn, memory.id)?
                .ok_or_else(|| anyhow!("Memory vanished after insert: {}", memory.id))
        })
    }

    /// Newest first. `None` returns every memory.
    pub fn list_memories(&self, limit: Option<u32>) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MEMORY_SELECT} ORDER BY m.created_at DESC LIMIT ?1");
            let limit = limit.map_or(-1, i64::from);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], memory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_memories_by_author(&self, author_id: &str) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MEMORY_SELECT} WHERE m.author_id = ?1 ORDER BY m.created_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], memory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryRow>> {
        self.with_conn(|conn| query_memory(conn, id))
    }

    pub fn memory_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM memories WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Image URLs of the newest memories.
    pub fn latest_memory_images(&self, limit: u32) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT image_url FROM memories ORDER BY created_at DESC LIMIT ?1")?;
            let rows = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments & replies --

    pub fn insert_comment(
        &self,
        id: &str,
        memory_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<CommentRow> {
        self.with_conn(|conn| {
            let now = self.next_timestamp();
            conn.execute(
                "INSERT INTO comments (id, memory_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, memory_id, author_id, content, now],
            )?;
            conn.execute(
                "UPDATE memories SET updated_at = ?2 WHERE id = ?1",
                rusqlite::params![memory_id, now],
            )?;
            query_comment(conn, id)?.ok_or_else(|| anyhow!("Comment vanished after insert: {}", id))
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// Comments of a memory, oldest first, each with its replies (oldest first).
    pub fn comments_for_memory(&self, memory_id: &str) -> Result<Vec<(CommentRow, Vec<ReplyRow>)>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} WHERE c.memory_id = ?1 ORDER BY c.created_at ASC");
            let mut stmt = conn.prepare(&sql)?;
            let comments = stmt
                .query_map([memory_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let comment_ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
            let mut replies = query_replies_for_comments(conn, &comment_ids)?;

            Ok(comments
                .into_iter()
                .map(|comment| {
                    let (mine, rest): (Vec<ReplyRow>, Vec<ReplyRow>) =
                        replies.drain(..).partition(|r| r.comment_id == comment.id);
                    replies = rest;
                    (comment, mine)
                })
                .collect())
        })
    }

    pub fn insert_reply(
        &self,
        id: &str,
        comment_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<ReplyRow> {
        self.with_conn(|conn| {
            let now = self.next_timestamp();
            conn.execute(
                "INSERT INTO replies (id, comment_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, comment_id, author_id, content, now],
            )?;
            query_reply(conn, id)?.ok_or_else(|| anyhow!("Reply vanished after insert: {}", id))
        })
    }

    pub fn get_reply(&self, id: &str) -> Result<Option<ReplyRow>> {
        self.with_conn(|conn| query_reply(conn, id))
    }

    // -- Likes --

    /// Toggle a like: removes it if present, inserts it otherwise.
    /// Returns (liked, like count after the toggle).
    pub fn toggle_like(&self, target: LikeTarget, target_id: &str, user_id: &str) -> Result<(bool, i64)> {
        self.with_conn(|conn| {
            let kind = target.as_str();
            let removed = conn.execute(
                "DELETE FROM likes WHERE target_kind = ?1 AND target_id = ?2 AND user_id = ?3",
                rusqlite::params![kind, target_id, user_id],
            )?;

            let liked = if removed > 0 {
                false
            } else {
                let now = self.next_timestamp();
                conn.execute(
                    "INSERT INTO likes (target_kind, target_id, user_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![kind, target_id, user_id, now],
                )?;
                true
            };

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE target_kind = ?1 AND target_id = ?2",
                rusqlite::params![kind, target_id],
                |row| row.get(0),
            )?;

            Ok((liked, count))
        })
    }

    // -- Chat --

    pub fn insert_chat_message(&self, message: &NewChatMessage<'_>) -> Result<ChatMessageRow> {
        self.with_conn(|conn| {
            let now = self.next_timestamp();
            conn.execute(
                "INSERT INTO chat_messages (id, content, sender_id, sender_name, sender_avatar, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id,
                    message.content,
                    message.sender_id,
                    message.sender_name,
                    message.sender_avatar,
                    now
                ],
            )?;
            Ok(ChatMessageRow {
                id: message.id.to_string(),
                content: message.content.to_string(),
                sender_id: message.sender_id.to_string(),
                sender_name: message.sender_name.to_string(),
                sender_avatar: message.sender_avatar.to_string(),
                created_at: now,
            })
        })
    }

    /// The `limit` most recent messages, returned oldest first.
    pub fn recent_chat_messages(&self, limit: u32) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, sender_id, sender_name, sender_avatar, created_at
                 FROM chat_messages
                 ORDER BY created_at DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt
                .query_map([limit], |row| {
                    Ok(ChatMessageRow {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        sender_id: row.get(2)?,
                        sender_name: row.get(3)?,
                        sender_avatar: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }
}

/// True when the error is a UNIQUE or PRIMARY KEY constraint failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                image: row.get(4)?,
                bio: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_memory(conn: &Connection, id: &str) -> Result<Option<MemoryRow>> {
    let sql = format!("{MEMORY_SELECT} WHERE m.id = ?1");
    let row = conn.prepare(&sql)?.query_row([id], memory_from_row).optional()?;
    Ok(row)
}

fn query_comment(conn: &Connection, id: &str) -> Result<Option<CommentRow>> {
    let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
    let row = conn.prepare(&sql)?.query_row([id], comment_from_row).optional()?;
    Ok(row)
}

fn query_reply(conn: &Connection, id: &str) -> Result<Option<ReplyRow>> {
    let sql = format!("{REPLY_SELECT} WHERE r.id = ?1");
    let row = conn.prepare(&sql)?.query_row([id], reply_from_row).optional()?;
    Ok(row)
}

/// Batch-fetch replies for a set of comment IDs.
fn query_replies_for_comments(conn: &Connection, comment_ids: &[String]) -> Result<Vec<ReplyRow>> {
    if comment_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=comment_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "{REPLY_SELECT} WHERE r.comment_id IN ({}) ORDER BY r.created_at ASC",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = comment_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), reply_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn author_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<AuthorRow> {
    Ok(AuthorRow {
        id: row.get(start)?,
        name: row.get(start + 1)?,
        image: row.get(start + 2)?,
    })
}

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image_url: row.get(3)?,
        author: author_from_row(row, 4)?,
        likes: row.get(7)?,
        comment_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        content: row.get(2)?,
        author: author_from_row(row, 3)?,
        likes: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn reply_from_row(row: &Row<'_>) -> rusqlite::Result<ReplyRow> {
    Ok(ReplyRow {
        id: row.get(0)?,
        comment_id: row.get(1)?,
        content: row.get(2)?,
        author: author_from_row(row, 3)?,
        likes: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
