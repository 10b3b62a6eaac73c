//! Formatting utilities: game notices and rankings as Telegram-style HTML.

use chrono::{DateTime, Utc};

use crate::{
    eval::EvalError,
    game::{EvaluationReport, RejectReason, RetractionKind, RetractionNotice},
    highscore::{HighscoreEvent, HighscoreView},
    leaderboard::{Contender, LeaderboardScope, RankedEntry},
};

const SUPPORTED_OPERATIONS: &str =
    "+, -, *, /, **, sin(), cos(), tan(), log(), log10(), sqrt(), exp(), pi, e";

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Bold title line followed by a body. `body` must already be HTML.
pub fn notice(title: &str, body: &str) -> String {
    format!("<b>{}</b>\n{body}", escape_html(title))
}

pub fn render_rejection(reason: RejectReason) -> String {
    let body = "Starting from <code>1</code> again.";
    match reason {
        RejectReason::SameContributor => notice("You cannot count twice in a row!", body),
        RejectReason::WrongNumber { expected } => {
            notice(&format!("The number was {expected}"), body)
        }
    }
}

pub fn render_highscore_event(event: HighscoreEvent) -> String {
    match event {
        HighscoreEvent::NewHighscore { highscore } => notice(
            "New highscore!",
            &format!("We reached a highscore of <code>{highscore}</code>!"),
        ),
        HighscoreEvent::Unchanged { highscore } => notice(
            "Better luck next time!",
            &format!("Current highscore is <code>{highscore}</code>. Try to beat it!"),
        ),
    }
}

/// `author_html` is the platform's mention of the author (already escaped).
pub fn render_retraction(n: &RetractionNotice, author_html: &str) -> String {
    let (title, verb) = match n.kind {
        RetractionKind::Deleted => ("Number Deleted", "deleted"),
        RetractionKind::Edited => ("Number Edited", "edited"),
    };
    notice(
        title,
        &format!(
            "{author_html} {verb} a message!\nCurrent count is <code>{}</code>.",
            n.current_count
        ),
    )
}

pub fn render_highscore_view(view: &HighscoreView, now: DateTime<Utc>) -> String {
    let last = view
        .last_sweep
        .map(|at| format_elapsed(at, now))
        .unwrap_or_else(|| "never".to_string());
    notice(
        "Highscore",
        &format!(
            "The current highscore is <code>{}</code>\nLast automatic update: {last}",
            view.highscore
        ),
    )
}

pub fn leaderboard_title(scope: LeaderboardScope) -> &'static str {
    match scope {
        LeaderboardScope::AllChannels => "Channel Leaderboard",
        LeaderboardScope::AllUsers => "User Leaderboard",
        LeaderboardScope::CurrentChannel => "Leaderboard of this Channel",
    }
}

/// One line per entry; medals for the podium. `label` renders a contender as HTML.
pub fn render_leaderboard(
    scope: LeaderboardScope,
    entries: &[RankedEntry],
    label: impl Fn(Contender) -> String,
) -> String {
    if entries.is_empty() {
        return notice(leaderboard_title(scope), "Nobody has counted yet.");
    }

    let lines = entries
        .iter()
        .map(|e| {
            let place = match e.rank {
                1 => "🥇".to_string(),
                2 => "🥈".to_string(),
                3 => "🥉".to_string(),
                n => format!("<b>#{n}</b>"),
            };
            format!(
                "{place} {} - Count: <code>{}</code>",
                label(e.contender),
                e.score
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    notice(leaderboard_title(scope), &lines)
}

pub fn render_evaluation(report: &EvaluationReport) -> String {
    let rounded = match report.rounded {
        Some(n) => format!("and will be rounded by the bot to <code>{n}</code>."),
        None => "but is too large to be counted.".to_string(),
    };
    notice(
        "Evaluated Number",
        &format!(
            "Task: <code>{}</code>\nThe evaluated number is <code>{}</code> {rounded}",
            escape_html(&report.expression),
            report.value
        ),
    )
}

pub fn render_evaluation_error(err: &EvalError) -> String {
    notice(
        "Error",
        &format!(
            "Eval doesn't know this number.\n<code>{}</code>\nSupported operations: {SUPPORTED_OPERATIONS}",
            escape_html(&err.to_string())
        ),
    )
}

/// Coarse "time since" label, e.g. `3m ago`, `2h 5m ago`, `1d 4h ago`.
pub fn format_elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(then).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }

    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let mins = (secs % 3600) / 60;

    if days > 0 {
        return format!("{days}d {hours}h ago");
    }
    if hours > 0 {
        return format!("{hours}h {mins}m ago");
    }
    format!("{mins}m ago")
}
