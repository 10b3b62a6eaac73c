//! Persistence port for the counting game.
//!
//! The store is the only owner of durable state. Implementations must make
//! each call atomic on its own; `increment_user_count` in particular is a
//! read-increment-write that must not lose updates under concurrency.
//! A game decision is written with exactly one call ([`CountingStore::accept_contribution`]
//! or [`CountingStore::reject_and_record`]), so a failed write leaves nothing behind.
//! Serializing the `{count, contributor}` read-modify-write of one channel is
//! the caller's job (see [`crate::locks::ChannelLocks`]).

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChannelState, UserId},
    highscore::HighscoreEvent,
    Result,
};

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait CountingStore: Send + Sync {
    /// Gate checked before any counting logic runs.
    async fn channel_is_registered(&self, channel: ChannelId) -> Result<bool>;

    /// `None` when the channel is not registered.
    async fn get_channel_state(&self, channel: ChannelId) -> Result<Option<ChannelState>>;
    async fn set_channel_state(&self, channel: ChannelId, state: ChannelState) -> Result<()>;

    /// Stored highscore; `0` for unknown channels.
    async fn get_highscore(&self, channel: ChannelId) -> Result<i64>;
    async fn set_highscore(&self, channel: ChannelId, highscore: i64) -> Result<()>;

    /// Atomic upsert: +1 on `(channel, user)`, creating the user and the row if absent.
    async fn increment_user_count(&self, channel: ChannelId, user: UserId) -> Result<()>;

    /// Store `next` and credit `user` with one contribution, all or nothing.
    async fn accept_contribution(
        &self,
        channel: ChannelId,
        next: ChannelState,
        user: UserId,
    ) -> Result<()>;

    /// Reset the channel to `{0, none}` and raise its highscore to `lost_count`
    /// if that beats it, all or nothing.
    async fn reject_and_record(&self, channel: ChannelId, lost_count: i64)
        -> Result<HighscoreEvent>;

    /// Ordered by score descending, ties by ascending id.
    async fn top_channels_by_highscore(&self, limit: usize) -> Result<Vec<(ChannelId, i64)>>;
    async fn top_users_in_channel(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<(UserId, i64)>>;
    async fn top_users_global(&self, limit: usize) -> Result<Vec<(UserId, i64)>>;

    /// Returns `false` if the channel was already registered.
    async fn register_channel(&self, channel: ChannelId) -> Result<bool>;
    /// Returns `false` if the channel was not registered.
    async fn unregister_channel(&self, channel: ChannelId) -> Result<bool>;

    /// Set `highscore = count` wherever `count > highscore`; returns rows changed.
    async fn raise_highscores(&self) -> Result<usize>;
}
