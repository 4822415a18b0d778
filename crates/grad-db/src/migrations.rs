use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::clock::parse_timestamp;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password    TEXT NOT NULL,
            image       TEXT NOT NULL DEFAULT '',
            bio         TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memories (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            description TEXT NOT NULL,
            image_url   TEXT NOT NULL,
            author_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_memories_created
            ON memories(created_at);

        CREATE INDEX IF NOT EXISTS idx_memories_author
            ON memories(author_id, created_at);

        CREATE TABLE IF NOT EXISTS comments (
            id          TEXT PRIMARY KEY,
            memory_id   TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            author_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comments_memory
            ON comments(memory_id, created_at);

        CREATE TABLE IF NOT EXISTS replies (
            id          TEXT PRIMARY KEY,
            comment_id  TEXT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
            author_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_replies_comment
            ON replies(comment_id, created_at);

        CREATE TABLE IF NOT EXISTS likes (
            target_kind TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            user_id     TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            PRIMARY KEY (target_kind, target_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id              TEXT PRIMARY KEY,
            content         TEXT NOT NULL,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            sender_name     TEXT NOT NULL,
            sender_avatar   TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_created
            ON chat_messages(created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

/// Newest creation timestamp across all tables, used to seed the clock on restart.
pub fn latest_timestamp(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = conn.query_row(
        "SELECT MAX(ts) FROM (
            SELECT MAX(updated_at) AS ts FROM users
            UNION ALL SELECT MAX(updated_at) FROM memories
            UNION ALL SELECT MAX(created_at) FROM comments
            UNION ALL SELECT MAX(created_at) FROM replies
            UNION ALL SELECT MAX(created_at) FROM likes
            UNION ALL SELECT MAX(created_at) FROM chat_messages
        )",
        [],
        |row| row.get(0),
    )?;

    Ok(latest.as_deref().and_then(parse_timestamp))
}
