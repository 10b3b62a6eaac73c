use std::path::Path;

use async_trait::async_trait;
use tally_core::{
    domain::{ChannelId, ChannelState, UserId},
    highscore::{judge_lost_count, HighscoreEvent},
    store::CountingStore,
    Result,
};
use tokio_rusqlite::Connection;
use tracing::info;

use crate::{migrations, queries, StoreError, StoreResult};

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// [`CountingStore`] backed by one SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
    path: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening counting database");

        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self {
            conn,
            path: path_str,
        };
        store
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode = WAL;
                    PRAGMA synchronous = NORMAL;
                    PRAGMA foreign_keys = ON;
                    PRAGMA busy_timeout = 5000;
                    ",
                )?;
                migrations::run_migrations(conn)
            })
            .await?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self {
            conn,
            path: ":memory:".to_string(),
        };
        store
            .call(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                migrations::run_migrations(conn)
            })
            .await?;
        Ok(store)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `f` on the connection thread. Keep it to SQL and row mapping.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer = self.conn.call(move |conn| Ok(f(conn))).await;
        match outer {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl CountingStore for SqliteStore {
    async fn channel_is_registered(&self, channel: ChannelId) -> Result<bool> {
        Ok(self
            .call(move |conn| queries::channel_exists(conn, channel.0))
            .await?)
    }

    async fn get_channel_state(&self, channel: ChannelId) -> Result<Option<ChannelState>> {
        let row = self
            .call(move |conn| queries::get_channel(conn, channel.0))
            .await?;
        Ok(row.map(|(count, last_user)| ChannelState {
            count,
            contributor: last_user.map(UserId),
        }))
    }

    async fn set_channel_state(&self, channel: ChannelId, state: ChannelState) -> Result<()> {
        Ok(self
            .call(move |conn| {
                queries::update_channel(
                    conn,
                    channel.0,
                    state.count,
                    state.contributor.map(|u| u.0),
                )
            })
            .await?)
    }

    async fn get_highscore(&self, channel: ChannelId) -> Result<i64> {
        Ok(self
            .call(move |conn| queries::get_highscore(conn, channel.0))
            .await?)
    }

    async fn set_highscore(&self, channel: ChannelId, highscore: i64) -> Result<()> {
        Ok(self
            .call(move |conn| queries::update_highscore(conn, channel.0, highscore))
            .await?)
    }

    async fn increment_user_count(&self, channel: ChannelId, user: UserId) -> Result<()> {
        Ok(self
            .call(move |conn| queries::increment_user_count(conn, channel.0, user.0))
            .await?)
    }

    async fn accept_contribution(
        &self,
        channel: ChannelId,
        next: ChannelState,
        user: UserId,
    ) -> Result<()> {
        Ok(self
            .call(move |conn| queries::accept_contribution(conn, channel.0, next.count, user.0))
            .await?)
    }

    async fn reject_and_record(
        &self,
        channel: ChannelId,
        lost_count: i64,
    ) -> Result<HighscoreEvent> {
        let stored = self
            .call(move |conn| queries::reject_and_record(conn, channel.0, lost_count))
            .await?;
        Ok(judge_lost_count(lost_count, stored))
    }

    async fn top_channels_by_highscore(&self, limit: usize) -> Result<Vec<(ChannelId, i64)>> {
        let rows = self
            .call(move |conn| queries::top_channels(conn, limit_param(limit)))
            .await?;
        Ok(rows.into_iter().map(|(id, h)| (ChannelId(id), h)).collect())
    }

    async fn top_users_in_channel(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<(UserId, i64)>> {
        let rows = self
            .call(move |conn| queries::top_users_in_channel(conn, channel.0, limit_param(limit)))
            .await?;
        Ok(rows.into_iter().map(|(id, n)| (UserId(id), n)).collect())
    }

    async fn top_users_global(&self, limit: usize) -> Result<Vec<(UserId, i64)>> {
        let rows = self
            .call(move |conn| queries::top_users_global(conn, limit_param(limit)))
            .await?;
        Ok(rows.into_iter().map(|(id, n)| (UserId(id), n)).collect())
    }

    async fn register_channel(&self, channel: ChannelId) -> Result<bool> {
        Ok(self
            .call(move |conn| queries::insert_channel(conn, channel.0))
            .await?)
    }

    async fn unregister_channel(&self, channel: ChannelId) -> Result<bool> {
        Ok(self
            .call(move |conn| queries::delete_channel(conn, channel.0))
            .await?)
    }

    async fn raise_highscores(&self) -> Result<usize> {
        Ok(self.call(|conn| queries::raise_highscores(conn)).await?)
    }
}
