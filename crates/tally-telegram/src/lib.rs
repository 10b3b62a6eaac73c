//! Telegram adapter (teloxide).
//!
//! Implements the `tally-core` MessagingPort over the Telegram Bot API and
//! routes incoming updates into the counting game.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode};

use tokio::time::sleep;

pub mod handlers;
pub mod router;
pub mod tracking;

use tally_core::{
    domain::{ChannelId, MessageId, MessageRef},
    errors::Error,
    formatting::escape_html,
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(channel: ChannelId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(channel.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn send(
        &self,
        channel: ChannelId,
        html: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(channel), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true);
                if let Some(id) = reply_to {
                    req = req
                        .reply_to_message_id(Self::tg_msg_id(id))
                        .allow_sending_without_reply(true);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            channel_id: channel,
            message_id: MessageId(msg.id.0),
        })
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, channel: ChannelId, html: &str) -> Result<MessageRef> {
        self.send(channel, html, None).await
    }

    async fn reply_html(&self, msg: MessageRef, html: &str) -> Result<MessageRef> {
        self.send(msg.channel_id, html, Some(msg.message_id)).await
    }

    /// The Bot API version teloxide 0.12 speaks has no message reactions, so
    /// the acknowledgment is a bare emoji reply to the counted message.
    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.send(msg.channel_id, &escape_html(emoji), Some(msg.message_id))
            .await?;
        Ok(())
    }
}
