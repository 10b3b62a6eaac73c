//! Synchronous statements. Each runs inside one `SqliteStore::call`.

use rusqlite::{params, Connection};

use crate::{StoreError, StoreResult};

/// `(count, last_user_id)` of a channel.
pub type ChannelRow = (i64, Option<i64>);

pub fn channel_exists(conn: &Connection, channel_id: i64) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM channels WHERE channel_id = ?1)",
        params![channel_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn get_channel(conn: &Connection, channel_id: i64) -> StoreResult<Option<ChannelRow>> {
    let result = conn.query_row(
        "SELECT count, last_user_id FROM channels WHERE channel_id = ?1",
        params![channel_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    );

    match result {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_channel(
    conn: &Connection,
    channel_id: i64,
    count: i64,
    last_user_id: Option<i64>,
) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE channels SET count = ?2, last_user_id = ?3 WHERE channel_id = ?1",
        params![channel_id, count, last_user_id],
    )?;
    if changed == 0 {
        return Err(StoreError::ChannelNotRegistered(channel_id));
    }
    Ok(())
}

pub fn get_highscore(conn: &Connection, channel_id: i64) -> StoreResult<i64> {
    let result = conn.query_row(
        "SELECT highscore FROM channels WHERE channel_id = ?1",
        params![channel_id],
        |row| row.get(0),
    );

    match result {
        Ok(h) => Ok(h),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

pub fn update_highscore(conn: &Connection, channel_id: i64, highscore: i64) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE channels SET highscore = ?2 WHERE channel_id = ?1",
        params![channel_id, highscore],
    )?;
    if changed == 0 {
        return Err(StoreError::ChannelNotRegistered(channel_id));
    }
    Ok(())
}

fn credit_user(conn: &Connection, channel_id: i64, user_id: i64) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id) VALUES (?1)",
        params![user_id],
    )?;
    conn.execute(
        "INSERT INTO channel_users (channel_id, user_id, count) VALUES (?1, ?2, 1)
         ON CONFLICT(channel_id, user_id) DO UPDATE SET count = count + 1",
        params![channel_id, user_id],
    )?;
    Ok(())
}

/// Creates the user row on first contribution, then bumps the pair counter.
pub fn increment_user_count(conn: &mut Connection, channel_id: i64, user_id: i64) -> StoreResult<()> {
    let tx = conn.transaction()?;
    credit_user(&tx, channel_id, user_id)?;
    tx.commit()?;
    Ok(())
}

/// New channel state plus the contributor's credit, in one transaction.
pub fn accept_contribution(
    conn: &mut Connection,
    channel_id: i64,
    count: i64,
    user_id: i64,
) -> StoreResult<()> {
    let tx = conn.transaction()?;
    update_channel(&tx, channel_id, count, Some(user_id))?;
    credit_user(&tx, channel_id, user_id)?;
    tx.commit()?;
    Ok(())
}

/// Reset the channel and keep the larger of `lost_count` and the stored
/// highscore, in one transaction. Returns the highscore stored before.
pub fn reject_and_record(
    conn: &mut Connection,
    channel_id: i64,
    lost_count: i64,
) -> StoreResult<i64> {
    let tx = conn.transaction()?;
    let stored = get_highscore(&tx, channel_id)?;
    update_channel(&tx, channel_id, 0, None)?;
    if lost_count > stored {
        update_highscore(&tx, channel_id, lost_count)?;
    }
    tx.commit()?;
    Ok(stored)
}

fn ranked_rows(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn top_channels(conn: &Connection, limit: i64) -> StoreResult<Vec<(i64, i64)>> {
    ranked_rows(
        conn,
        "SELECT channel_id, highscore FROM channels
         ORDER BY highscore DESC, channel_id ASC LIMIT ?1",
        params![limit],
    )
}

pub fn top_users_in_channel(
    conn: &Connection,
    channel_id: i64,
    limit: i64,
) -> StoreResult<Vec<(i64, i64)>> {
    ranked_rows(
        conn,
        "SELECT user_id, count FROM channel_users WHERE channel_id = ?1
         ORDER BY count DESC, user_id ASC LIMIT ?2",
        params![channel_id, limit],
    )
}

pub fn top_users_global(conn: &Connection, limit: i64) -> StoreResult<Vec<(i64, i64)>> {
    ranked_rows(
        conn,
        "SELECT user_id, SUM(count) AS total FROM channel_users
         GROUP BY user_id ORDER BY total DESC, user_id ASC LIMIT ?1",
        params![limit],
    )
}

pub fn insert_channel(conn: &Connection, channel_id: i64) -> StoreResult<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO channels (channel_id) VALUES (?1)",
        params![channel_id],
    )?;
    Ok(changed > 0)
}

pub fn delete_channel(conn: &Connection, channel_id: i64) -> StoreResult<bool> {
    let changed = conn.execute(
        "DELETE FROM channels WHERE channel_id = ?1",
        params![channel_id],
    )?;
    Ok(changed > 0)
}

pub fn raise_highscores(conn: &Connection) -> StoreResult<usize> {
    let changed = conn.execute(
        "UPDATE channels SET highscore = count WHERE count > highscore",
        [],
    )?;
    Ok(changed)
}
