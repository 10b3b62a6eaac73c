//! Memory of the message that carries each channel's live count.
//!
//! Telegram reports an edit with the new text only, so the value the message
//! used to hold has to be remembered when it is accepted.

use std::collections::HashMap;

use tokio::sync::Mutex;

use tally_core::domain::{ChannelId, MessageId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountedMessage {
    pub message_id: MessageId,
    pub author: UserId,
    pub count: i64,
}

#[derive(Default)]
pub struct LiveCounts {
    inner: Mutex<HashMap<ChannelId, CountedMessage>>,
}

impl LiveCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was tracked for `channel`.
    pub async fn remember(&self, channel: ChannelId, counted: CountedMessage) {
        self.inner.lock().await.insert(channel, counted);
    }

    /// The tracked message for `channel`, if it is `message_id`.
    ///
    /// It stays tracked; every edit of the live message is reported.
    pub async fn lookup(&self, channel: ChannelId, message_id: MessageId) -> Option<CountedMessage> {
        let map = self.inner.lock().await;
        map.get(&channel)
            .filter(|c| c.message_id == message_id)
            .copied()
    }

    pub async fn forget(&self, channel: ChannelId) {
        self.inner.lock().await.remove(&channel);
    }
}
