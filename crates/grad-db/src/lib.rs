pub mod clock;
pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::clock::MonotonicClock;

pub use queries::is_unique_violation;

pub struct Database {
    conn: Mutex<Connection>,
    clock: MonotonicClock,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        let clock = MonotonicClock::new();
        if let Some(latest) = migrations::latest_timestamp(&conn)? {
            clock.observe(latest);
        }

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Next creation timestamp, strictly later than every one handed out before.
    pub fn next_timestamp(&self) -> String {
        clock::format_timestamp(self.clock.now())
    }
}
