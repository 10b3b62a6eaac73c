use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use tracing::{error, warn};

use tally_core::{
    audit::AuditEvent,
    domain::{ChannelId, MessageRef},
    errors::Error,
    formatting::{
        escape_html, notice, render_evaluation, render_evaluation_error, render_highscore_view,
        render_leaderboard,
    },
    game::evaluation_report,
    leaderboard::{Contender, LeaderboardScope, RankedEntry},
    permissions::ChatStanding,
};

use super::{channel_of, failure_html, mention_html, message_ref, user_id_of};
use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Command {
    Enable,
    Disable,
    Highscore,
    ResetHighscore,
    Leaderboard(String),
    Eval(String),
}

impl Command {
    /// `None` for commands meant for other bots.
    fn from_parts(cmd: &str, arg: String) -> Option<Self> {
        Some(match cmd {
            "enable" => Command::Enable,
            "disable" => Command::Disable,
            "highscore" => Command::Highscore,
            "reset_highscore" => Command::ResetHighscore,
            "leaderboard" => Command::Leaderboard(arg),
            "eval" | "eval_number" => Command::Eval(arg),
            _ => return None,
        })
    }

    fn needs_admin(&self) -> bool {
        matches!(
            self,
            Command::Enable | Command::Disable | Command::ResetHighscore
        )
    }
}

fn not_enabled_html() -> String {
    notice("Sorry!", "This channel is not activated for counting.")
}

fn missing_permissions_html() -> String {
    notice(
        "Missing Permissions",
        "Only chat administrators can use this command.",
    )
}

fn sweep_footer(state: &AppState) -> String {
    let mins = (state.cfg.sweep_interval.as_secs() / 60).max(1);
    format!("<i>The highscore is updated every {mins} minutes.</i>")
}

async fn standing(bot: &Bot, msg: &Message, user: &teloxide::types::User) -> ChatStanding {
    if msg.chat.is_private() {
        return ChatStanding::PrivateChat;
    }
    match bot.get_chat_member(msg.chat.id, user.id).await {
        Ok(member) if member.is_privileged() => ChatStanding::Privileged,
        Ok(_) => ChatStanding::Member,
        Err(e) => {
            warn!(chat_id = msg.chat.id.0, error = %e, "getChatMember failed");
            ChatStanding::Member
        }
    }
}

pub async fn handle_command(bot: Bot, msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let (cmd, arg) = parse_command(text);
    let Some(command) = Command::from_parts(&cmd, arg) else {
        return Ok(());
    };

    let channel = channel_of(msg);
    let user_id = user_id_of(user);
    let username = user.username.clone().unwrap_or_default();

    if command.needs_admin() {
        let standing = standing(&bot, msg, user).await;
        if !state.admins.may_administer(Some(user_id), standing) {
            reply(&state, msg, &missing_permissions_html()).await;
            state.audit(AuditEvent::command(channel, user_id, &username, &cmd, "denied"));
            return Ok(());
        }
    }

    let result = run_command(&bot, msg, &state, command).await;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(Error::ChannelNotRegistered(_)) => {
            reply(&state, msg, &not_enabled_html()).await;
            "not enabled".to_string()
        }
        Err(e) => {
            error!(channel_id = channel.0, command = %cmd, error = %e, "Command failed");
            reply(&state, msg, &failure_html()).await;
            state.audit(AuditEvent::error(
                channel,
                Some(user_id),
                &username,
                &e.to_string(),
                Some(&cmd),
            ));
            return Ok(());
        }
    };

    state.audit(AuditEvent::command(channel, user_id, &username, &cmd, &outcome));
    Ok(())
}

/// Returns a short outcome for the audit log.
async fn run_command(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    command: Command,
) -> tally_core::Result<String> {
    let channel = channel_of(msg);
    let here = chat_label(msg);

    match command {
        Command::Enable => {
            let html = if state.game.enable_channel(channel).await? {
                notice(
                    "Channel Added",
                    &format!("{here} is now a counting channel."),
                )
            } else {
                notice(
                    "Channel Added",
                    &format!("{here} is already a counting channel."),
                )
            };
            reply(state, msg, &html).await;
            Ok("enabled".to_string())
        }

        Command::Disable => {
            let html = if state.game.disable_channel(channel).await? {
                state.live_counts.forget(channel).await;
                notice(
                    "Channel Removed",
                    &format!("{here} is no longer a counting channel."),
                )
            } else {
                notice(
                    "Channel Removed",
                    &format!("{here} is not a counting channel."),
                )
            };
            reply(state, msg, &html).await;
            Ok("disabled".to_string())
        }

        Command::Highscore => {
            let view = state.game.highscores().view(channel).await?;
            let html = format!(
                "{}\n\n{}",
                render_highscore_view(&view, Utc::now()),
                sweep_footer(state)
            );
            reply(state, msg, &html).await;
            Ok(format!("highscore {}", view.highscore))
        }

        Command::ResetHighscore => {
            state.game.reset_highscore(channel).await?;
            reply(
                state,
                msg,
                &notice("Highscore Reset", "Highscore successfully reset!"),
            )
            .await;
            Ok("highscore reset".to_string())
        }

        Command::Leaderboard(arg) => {
            let scope = match arg.parse::<LeaderboardScope>() {
                Ok(scope) => scope,
                Err(e) => {
                    let html = notice(
                        "Leaderboard",
                        &format!(
                            "{}\nUse <code>/leaderboard</code>, <code>/leaderboard channels</code> or <code>/leaderboard users</code>.",
                            escape_html(&e)
                        ),
                    );
                    reply(state, msg, &html).await;
                    return Ok("bad leaderboard scope".to_string());
                }
            };
            let entries = state.leaderboard.query(scope, channel).await?;
            let labels = contender_labels(bot, msg, &entries).await;
            let html = render_leaderboard(scope, &entries, |c| {
                labels
                    .iter()
                    .find(|(k, _)| *k == c)
                    .map(|(_, label)| label.clone())
                    .unwrap_or_default()
            });
            reply(state, msg, &html).await;
            Ok(format!("leaderboard {scope:?}"))
        }

        Command::Eval(expr) => {
            let html = match evaluation_report(&expr) {
                Ok(report) => render_evaluation(&report),
                Err(e) => render_evaluation_error(&e),
            };
            reply(state, msg, &html).await;
            Ok("eval".to_string())
        }
    }
}

fn chat_label(msg: &Message) -> String {
    match msg.chat.title() {
        Some(title) => format!("<b>{}</b>", escape_html(title)),
        None => "This chat".to_string(),
    }
}

/// Resolve display names for a leaderboard; ids stand in when the lookup fails.
async fn contender_labels(
    bot: &Bot,
    msg: &Message,
    entries: &[RankedEntry],
) -> Vec<(Contender, String)> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let label = match entry.contender {
            Contender::Channel(ChannelId(id)) => {
                match bot.get_chat(teloxide::types::ChatId(id)).await {
                    Ok(chat) => escape_html(chat.title().unwrap_or("private chat")),
                    Err(_) => format!("Chat <code>{id}</code>"),
                }
            }
            Contender::User(user) => {
                let name = bot
                    .get_chat_member(msg.chat.id, teloxide::types::UserId(user.0 as u64))
                    .await
                    .map(|m| m.user.full_name())
                    .unwrap_or_else(|_| format!("User {}", user.0));
                mention_html(user, &name)
            }
        };
        out.push((entry.contender, label));
    }
    out
}

async fn reply(state: &AppState, msg: &Message, html: &str) {
    let target: MessageRef = message_ref(msg);
    if let Err(e) = state.messenger.reply_html(target, html).await {
        warn!(channel_id = target.channel_id.0, error = %e, "Failed to send reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/Leaderboard@TallyBot  all users "),
            ("leaderboard".to_string(), "all users".to_string())
        );
        assert_eq!(parse_command("/enable"), ("enable".to_string(), String::new()));
    }

    #[test]
    fn maps_commands_and_aliases() {
        assert_eq!(
            Command::from_parts("eval_number", "2+2".to_string()),
            Some(Command::Eval("2+2".to_string()))
        );
        assert_eq!(Command::from_parts("help", String::new()), None);
        assert_eq!(Command::from_parts("weather", String::new()), None);
    }

    #[test]
    fn only_channel_management_needs_admin() {
        assert!(Command::Enable.needs_admin());
        assert!(Command::Disable.needs_admin());
        assert!(Command::ResetHighscore.needs_admin());
        assert!(!Command::Highscore.needs_admin());
        assert!(!Command::Leaderboard(String::new()).needs_admin());
        assert!(!Command::Eval(String::new()).needs_admin());
    }
}
