use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{ChannelId, ChannelState, UserId},
    highscore::{judge_lost_count, HighscoreEvent},
    store::CountingStore,
    Error, Result,
};

#[derive(Clone, Copy, Debug, Default)]
struct ChannelRow {
    state: ChannelState,
    highscore: i64,
}

#[derive(Default)]
struct Tables {
    channels: BTreeMap<ChannelId, ChannelRow>,
    channel_users: BTreeMap<(ChannelId, UserId), i64>,
}

/// In-process [`CountingStore`]. Every call holds one lock over all tables, so
/// each operation is atomic. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contribution count of one user in one channel (0 if absent).
    pub async fn user_count(&self, channel: ChannelId, user: UserId) -> i64 {
        let t = self.tables.lock().await;
        t.channel_users.get(&(channel, user)).copied().unwrap_or(0)
    }
}

fn ranked<K: Copy + Ord>(rows: impl Iterator<Item = (K, i64)>, limit: usize) -> Vec<(K, i64)> {
    let mut out: Vec<(K, i64)> = rows.collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    out.truncate(limit);
    out
}

#[async_trait]
impl CountingStore for MemoryStore {
    async fn channel_is_registered(&self, channel: ChannelId) -> Result<bool> {
        Ok(self.tables.lock().await.channels.contains_key(&channel))
    }

    async fn get_channel_state(&self, channel: ChannelId) -> Result<Option<ChannelState>> {
        let t = self.tables.lock().await;
        Ok(t.channels.get(&channel).map(|row| row.state))
    }

    async fn set_channel_state(&self, channel: ChannelId, state: ChannelState) -> Result<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .channels
            .get_mut(&channel)
            .ok_or(Error::ChannelNotRegistered(channel))?;
        row.state = state;
        Ok(())
    }

    async fn get_highscore(&self, channel: ChannelId) -> Result<i64> {
        let t = self.tables.lock().await;
        Ok(t.channels.get(&channel).map(|row| row.highscore).unwrap_or(0))
    }

    async fn set_highscore(&self, channel: ChannelId, highscore: i64) -> Result<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .channels
            .get_mut(&channel)
            .ok_or(Error::ChannelNotRegistered(channel))?;
        row.highscore = highscore;
        Ok(())
    }

    async fn increment_user_count(&self, channel: ChannelId, user: UserId) -> Result<()> {
        let mut t = self.tables.lock().await;
        *t.channel_users.entry((channel, user)).or_insert(0) += 1;
        Ok(())
    }

    async fn accept_contribution(
        &self,
        channel: ChannelId,
        next: ChannelState,
        user: UserId,
    ) -> Result<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .channels
            .get_mut(&channel)
            .ok_or(Error::ChannelNotRegistered(channel))?;
        row.state = next;
        *t.channel_users.entry((channel, user)).or_insert(0) += 1;
        Ok(())
    }

    async fn reject_and_record(
        &self,
        channel: ChannelId,
        lost_count: i64,
    ) -> Result<HighscoreEvent> {
        let mut t = self.tables.lock().await;
        let row = t
            .channels
            .get_mut(&channel)
            .ok_or(Error::ChannelNotRegistered(channel))?;
        let event = judge_lost_count(lost_count, row.highscore);
        row.state = ChannelState::reset();
        row.highscore = event.highscore();
        Ok(event)
    }

    async fn top_channels_by_highscore(&self, limit: usize) -> Result<Vec<(ChannelId, i64)>> {
        let t = self.tables.lock().await;
        Ok(ranked(
            t.channels.iter().map(|(id, row)| (*id, row.highscore)),
            limit,
        ))
    }

    async fn top_users_in_channel(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<(UserId, i64)>> {
        let t = self.tables.lock().await;
        Ok(ranked(
            t.channel_users
                .iter()
                .filter(|((c, _), _)| *c == channel)
                .map(|((_, u), count)| (*u, *count)),
            limit,
        ))
    }

    async fn top_users_global(&self, limit: usize) -> Result<Vec<(UserId, i64)>> {
        let t = self.tables.lock().await;
        let mut totals: HashMap<UserId, i64> = HashMap::new();
        for ((_, user), count) in &t.channel_users {
            *totals.entry(*user).or_insert(0) += count;
        }
        Ok(ranked(totals.into_iter(), limit))
    }

    async fn register_channel(&self, channel: ChannelId) -> Result<bool> {
        let mut t = self.tables.lock().await;
        if t.channels.contains_key(&channel) {
            return Ok(false);
        }
        t.channels.insert(channel, ChannelRow::default());
        Ok(true)
    }

    async fn unregister_channel(&self, channel: ChannelId) -> Result<bool> {
        Ok(self.tables.lock().await.channels.remove(&channel).is_some())
    }

    async fn raise_highscores(&self) -> Result<usize> {
        let mut t = self.tables.lock().await;
        let mut raised = 0usize;
        for row in t.channels.values_mut() {
            if row.state.count > row.highscore {
                row.highscore = row.state.count;
                raised += 1;
            }
        }
        Ok(raised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_channel_has_no_state() {
        let store = MemoryStore::new();
        let ch = ChannelId(1);
        assert!(!store.channel_is_registered(ch).await.unwrap());
        assert_eq!(store.get_channel_state(ch).await.unwrap(), None);
        assert_eq!(store.get_highscore(ch).await.unwrap(), 0);
        assert!(matches!(
            store.set_channel_state(ch, ChannelState::reset()).await,
            Err(Error::ChannelNotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn register_is_idempotent_and_unregister_reports_absence() {
        let store = MemoryStore::new();
        let ch = ChannelId(7);
        assert!(store.register_channel(ch).await.unwrap());
        assert!(!store.register_channel(ch).await.unwrap());
        assert_eq!(
            store.get_channel_state(ch).await.unwrap(),
            Some(ChannelState::reset())
        );
        assert!(store.unregister_channel(ch).await.unwrap());
        assert!(!store.unregister_channel(ch).await.unwrap());
    }

    #[tokio::test]
    async fn decisions_require_a_registered_channel() {
        let store = MemoryStore::new();
        let ch = ChannelId(3);
        let next = ChannelState {
            count: 1,
            contributor: Some(UserId(1)),
        };
        assert!(matches!(
            store.accept_contribution(ch, next, UserId(1)).await,
            Err(Error::ChannelNotRegistered(_))
        ));
        assert!(matches!(
            store.reject_and_record(ch, 4).await,
            Err(Error::ChannelNotRegistered(_))
        ));
        assert_eq!(store.user_count(ch, UserId(1)).await, 0);
    }

    #[tokio::test]
    async fn reject_resets_and_keeps_the_larger_highscore() {
        let store = MemoryStore::new();
        let ch = ChannelId(4);
        store.register_channel(ch).await.unwrap();
        store.set_highscore(ch, 10).await.unwrap();

        assert_eq!(
            store.reject_and_record(ch, 6).await.unwrap(),
            HighscoreEvent::Unchanged { highscore: 10 }
        );
        assert_eq!(
            store.reject_and_record(ch, 12).await.unwrap(),
            HighscoreEvent::NewHighscore { highscore: 12 }
        );
        assert_eq!(store.get_highscore(ch).await.unwrap(), 12);
        assert_eq!(
            store.get_channel_state(ch).await.unwrap(),
            Some(ChannelState::reset())
        );
    }

    #[tokio::test]
    async fn ties_are_ordered_by_id() {
        let store = MemoryStore::new();
        for id in [3, 1, 2] {
            store.register_channel(ChannelId(id)).await.unwrap();
            store.set_highscore(ChannelId(id), 5).await.unwrap();
        }
        store.set_highscore(ChannelId(2), 9).await.unwrap();

        let top = store.top_channels_by_highscore(10).await.unwrap();
        assert_eq!(
            top,
            vec![(ChannelId(2), 9), (ChannelId(1), 5), (ChannelId(3), 5)]
        );
    }
}
