use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;

use grad_db::Database;
use grad_gateway::{ChatRoom, PresenceMap};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub room: ChatRoom,
    pub upload_dir: PathBuf,
    pub countdown_start: DateTime<Utc>,
    pub countdown_target: DateTime<Utc>,
}

impl AppStateInner {
    pub fn new(
        db: Database,
        jwt_secret: String,
        upload_dir: PathBuf,
        countdown_start: DateTime<Utc>,
        countdown_target: DateTime<Utc>,
    ) -> AppState {
        let db = Arc::new(db);
        let room = ChatRoom::new(db.clone(), PresenceMap::new());
        Arc::new(Self {
            db,
            jwt_secret,
            room,
            upload_dir,
            countdown_start,
            countdown_target,
        })
    }

    /// Run a blocking DB call off the async runtime.
    pub async fn db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
            })?
            .map_err(ApiError::from)
    }
}
