//! Schema migrations, tracked in the `migrations` table and applied in order.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::{StoreError, StoreResult};

pub const CURRENT_VERSION: i32 = 1;

pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current_version} is newer than this build (v{CURRENT_VERSION})"
        )));
    }

    info!(
        current_version,
        target_version = CURRENT_VERSION,
        "Running migrations"
    );

    if current_version < 1 {
        migrate_v1_initial_schema(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: channels, users, per-channel contribution counts.
///
/// `channel_users` has no foreign key to `channels`: disabling a channel drops
/// its game row but keeps lifetime user stats.
fn migrate_v1_initial_schema(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: initial schema");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS channels (
            channel_id INTEGER PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0,
            last_user_id INTEGER,
            highscore INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_channels_highscore
            ON channels(highscore DESC);

        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channel_users (
            channel_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL REFERENCES users(user_id),
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_channel_users_user
            ON channel_users(user_id);
        ",
    )?;

    record_migration(conn, 1, "initial_schema")?;
    Ok(())
}
