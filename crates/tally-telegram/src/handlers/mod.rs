//! Telegram update handlers.
//!
//! Commands go to `commands`, every other text message is a counting
//! candidate, and edits are checked against the tracked live count.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use tally_core::{
    domain::{ChannelId, MessageId, MessageRef, UserId},
    formatting::{escape_html, notice},
};

use crate::router::AppState;

mod commands;
mod counting;
mod edits;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with('/') {
        return commands::handle_command(bot, &msg, state).await;
    }
    counting::handle_count(&msg, state).await
}

pub async fn handle_edited_message(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    edits::handle_edit(&msg, state).await
}

fn channel_of(msg: &Message) -> ChannelId {
    ChannelId(msg.chat.id.0)
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        channel_id: channel_of(msg),
        message_id: MessageId(msg.id.0),
    }
}

fn user_id_of(user: &teloxide::types::User) -> UserId {
    UserId(user.id.0 as i64)
}

/// Generic reply for a failed handler; details stay in the logs.
fn failure_html() -> String {
    notice("Error", "Something went wrong. Please try again later.")
}

/// Clickable mention that does not require a username.
fn mention_html(user: UserId, name: &str) -> String {
    format!("<a href=\"tg://user?id={}\">{}</a>", user.0, escape_html(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_escapes_name() {
        assert_eq!(
            mention_html(UserId(12), "<Ada & Co>"),
            "<a href=\"tg://user?id=12\">&lt;Ada &amp; Co&gt;</a>"
        );
    }
}
