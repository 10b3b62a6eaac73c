//! Read-only rankings over persisted statistics.

use std::{str::FromStr, sync::Arc};

use crate::{
    domain::{ChannelId, UserId},
    store::CountingStore,
    Error, Result,
};

pub const LEADERBOARD_LIMIT: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderboardScope {
    /// Channels by highscore.
    AllChannels,
    /// Users by total contributions across all channels.
    AllUsers,
    /// Users by contributions in the current channel.
    CurrentChannel,
}

impl FromStr for LeaderboardScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "channel" | "current" | "current channel" | "here" => {
                Ok(LeaderboardScope::CurrentChannel)
            }
            "channels" | "servers" | "chats" | "all servers" | "all channels" => {
                Ok(LeaderboardScope::AllChannels)
            }
            "users" | "all users" | "global" => Ok(LeaderboardScope::AllUsers),
            other => Err(format!("unknown leaderboard `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contender {
    Channel(ChannelId),
    User(UserId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankedEntry {
    /// 1-based.
    pub rank: usize,
    pub contender: Contender,
    pub score: i64,
}

#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn CountingStore>,
}

/// Sort descending by score (stable for ties), cap at the limit, assign ranks.
fn rank<K>(rows: Vec<(K, i64)>, wrap: impl Fn(K) -> Contender) -> Vec<RankedEntry> {
    let mut rows = rows;
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows.into_iter()
        .take(LEADERBOARD_LIMIT)
        .enumerate()
        .map(|(i, (id, score))| RankedEntry {
            rank: i + 1,
            contender: wrap(id),
            score,
        })
        .collect()
}

impl Leaderboard {
    pub fn new(store: Arc<dyn CountingStore>) -> Self {
        Self { store }
    }

    pub async fn top_channels(&self) -> Result<Vec<RankedEntry>> {
        let rows = self
            .store
            .top_channels_by_highscore(LEADERBOARD_LIMIT)
            .await?;
        Ok(rank(rows, Contender::Channel))
    }

    pub async fn top_users_in_channel(&self, channel: ChannelId) -> Result<Vec<RankedEntry>> {
        let rows = self
            .store
            .top_users_in_channel(channel, LEADERBOARD_LIMIT)
            .await?;
        Ok(rank(rows, Contender::User))
    }

    pub async fn top_users_global(&self) -> Result<Vec<RankedEntry>> {
        let rows = self.store.top_users_global(LEADERBOARD_LIMIT).await?;
        Ok(rank(rows, Contender::User))
    }

    /// Dispatch a leaderboard command. The current-channel board needs an enabled channel.
    pub async fn query(
        &self,
        scope: LeaderboardScope,
        channel: ChannelId,
    ) -> Result<Vec<RankedEntry>> {
        match scope {
            LeaderboardScope::AllChannels => self.top_channels().await,
            LeaderboardScope::AllUsers => self.top_users_global().await,
            LeaderboardScope::CurrentChannel => {
                if !self.store.channel_is_registered(channel).await? {
                    return Err(Error::ChannelNotRegistered(channel));
                }
                self.top_users_in_channel(channel).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn seeded() -> (Arc<MemoryStore>, Leaderboard) {
        let store = Arc::new(MemoryStore::new());
        let (a, b) = (ChannelId(100), ChannelId(200));
        store.register_channel(a).await.unwrap();
        store.register_channel(b).await.unwrap();
        store.set_highscore(a, 12).await.unwrap();
        store.set_highscore(b, 40).await.unwrap();

        // user 1: 3 in a; user 2: 2 in a + 4 in b; user 3: 1 in b
        for (ch, user, n) in [(a, 1, 3), (a, 2, 2), (b, 2, 4), (b, 3, 1)] {
            for _ in 0..n {
                store.increment_user_count(ch, UserId(user)).await.unwrap();
            }
        }
        let board = Leaderboard::new(store.clone());
        (store, board)
    }

    fn scores(entries: &[RankedEntry]) -> Vec<(Contender, i64)> {
        entries.iter().map(|e| (e.contender, e.score)).collect()
    }

    #[tokio::test]
    async fn channels_ranked_by_highscore() {
        let (_, board) = seeded().await;
        let top = board.top_channels().await.unwrap();
        assert_eq!(
            scores(&top),
            vec![
                (Contender::Channel(ChannelId(200)), 40),
                (Contender::Channel(ChannelId(100)), 12),
            ]
        );
        assert_eq!(top[0].rank, 1);
        assert_eq!(top[1].rank, 2);
    }

    #[tokio::test]
    async fn users_ranked_per_channel_and_globally() {
        let (_, board) = seeded().await;

        let in_a = board.top_users_in_channel(ChannelId(100)).await.unwrap();
        assert_eq!(
            scores(&in_a),
            vec![
                (Contender::User(UserId(1)), 3),
                (Contender::User(UserId(2)), 2)
            ]
        );

        let global = board.top_users_global().await.unwrap();
        assert_eq!(
            scores(&global),
            vec![
                (Contender::User(UserId(2)), 6),
                (Contender::User(UserId(1)), 3),
                (Contender::User(UserId(3)), 1),
            ]
        );
    }

    #[tokio::test]
    async fn results_are_capped_at_ten() {
        let store = Arc::new(MemoryStore::new());
        for id in 0..15 {
            store.register_channel(ChannelId(id)).await.unwrap();
            store.set_highscore(ChannelId(id), id).await.unwrap();
        }
        let board = Leaderboard::new(store);
        let top = board.top_channels().await.unwrap();
        assert_eq!(top.len(), LEADERBOARD_LIMIT);
        assert_eq!(top[0].score, 14);
        assert_eq!(top[9].rank, 10);
    }

    #[tokio::test]
    async fn current_channel_board_requires_registration() {
        let (_, board) = seeded().await;
        assert!(matches!(
            board
                .query(LeaderboardScope::CurrentChannel, ChannelId(999))
                .await,
            Err(Error::ChannelNotRegistered(_))
        ));
        assert!(board
            .query(LeaderboardScope::AllUsers, ChannelId(999))
            .await
            .is_ok());
    }

    #[test]
    fn scope_parsing() {
        assert_eq!(
            "".parse::<LeaderboardScope>().unwrap(),
            LeaderboardScope::CurrentChannel
        );
        assert_eq!(
            "All Servers".parse::<LeaderboardScope>().unwrap(),
            LeaderboardScope::AllChannels
        );
        assert_eq!(
            "users".parse::<LeaderboardScope>().unwrap(),
            LeaderboardScope::AllUsers
        );
        assert!("weekly".parse::<LeaderboardScope>().is_err());
    }
}
