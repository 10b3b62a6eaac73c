use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tracing::{info, warn};

use tally_core::{
    audit::{AuditEvent, AuditLogger},
    config::Config,
    game::CountingGame,
    leaderboard::Leaderboard,
    messaging::{MessagingPort, ThrottleConfig, ThrottledMessenger},
    permissions::AdminPolicy,
};

use crate::{handlers, tracking::LiveCounts, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub game: Arc<CountingGame>,
    pub leaderboard: Leaderboard,
    pub admins: AdminPolicy,
    pub messenger: Arc<dyn MessagingPort>,
    pub live_counts: Arc<LiveCounts>,
    pub audit: Option<Arc<AuditLogger>>,
}

impl AppState {
    /// Best-effort audit write; failures are logged and swallowed.
    pub fn audit(&self, event: AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(e) = audit.write(event) {
            warn!(error = %e, path = %audit.path().display(), "Failed to write audit event");
        }
    }
}

fn command_menu() -> Vec<BotCommand> {
    vec![
        BotCommand::new("enable", "Make this chat a counting channel (admins)"),
        BotCommand::new("disable", "Stop counting in this chat (admins)"),
        BotCommand::new("highscore", "Show this chat's highscore"),
        BotCommand::new("reset_highscore", "Reset this chat's highscore (admins)"),
        BotCommand::new("leaderboard", "Rankings: channel, channels or users"),
        BotCommand::new("eval", "Show what the bot makes of an expression"),
    ]
}

pub async fn run_polling(
    cfg: Arc<Config>,
    game: Arc<CountingGame>,
    leaderboard: Leaderboard,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "Counting bot started"),
        Err(e) => warn!(error = %e, "getMe failed; continuing"),
    }
    if let Err(e) = bot.set_my_commands(command_menu()).await {
        warn!(error = %e, "Failed to publish command menu");
    }

    // Throttle outbound calls; the Telegram adapter still retries once on 429.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::from(cfg.as_ref()),
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        game,
        leaderboard,
        admins: AdminPolicy::from_config(&cfg),
        messenger,
        live_counts: Arc::new(LiveCounts::new()),
        audit: AuditLogger::from_config(&cfg).map(Arc::new),
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_commands_are_valid_bot_commands() {
        for cmd in command_menu() {
            assert!(cmd.command.len() <= 32);
            assert!(cmd
                .command
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            assert!(!cmd.description.is_empty());
        }
    }
}
