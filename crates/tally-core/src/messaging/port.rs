use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageRef},
    Result,
};

/// Everything the game needs to say back to a channel.
///
/// All text is HTML in the subset Telegram accepts (`<b>`, `<code>`, `<a>`).
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, channel: ChannelId, html: &str) -> Result<MessageRef>;

    /// Send `html` as a reply to `msg`.
    async fn reply_html(&self, msg: MessageRef, html: &str) -> Result<MessageRef>;

    /// Acknowledge `msg` with a single emoji.
    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;
}
