use std::fmt;

use serde::Serialize;

/// Chat / channel id (numeric, as delivered by the chat platform).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChannelId(pub i64);

/// Chat member id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UserId(pub i64);

/// Message id within a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live counting state of one channel: `{count, contributor}`.
///
/// `count == 0` with no contributor is the freshly reset game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub count: i64,
    pub contributor: Option<UserId>,
}

impl ChannelState {
    pub fn reset() -> Self {
        Self::default()
    }

    pub fn expected_next(&self) -> i64 {
        self.count.saturating_add(1)
    }
}
