use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, warn};

use tally_core::{
    audit::AuditEvent,
    domain::{ChannelId, MessageId, UserId},
    formatting::render_retraction,
    game::{CountingGame, RetractionKind},
    Result,
};

use super::{channel_of, mention_html, user_id_of};
use crate::{router::AppState, tracking::LiveCounts};

/// Editing the message that holds the live count does not change the count,
/// but the channel is told what the count still is.
pub async fn handle_edit(msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let channel = channel_of(msg);
    let editor = msg.from().map(|u| (user_id_of(u), u.full_name()));
    let editor_id = editor.as_ref().map(|(id, _)| *id);

    let html = match edit_notice(
        &state.game,
        &state.live_counts,
        channel,
        MessageId(msg.id.0),
        editor,
    )
    .await
    {
        Ok(Some(html)) => html,
        Ok(None) => return Ok(()),
        Err(e) => {
            error!(channel_id = channel.0, error = %e, "Retraction check failed");
            state.audit(AuditEvent::error(
                channel,
                editor_id,
                "",
                &e.to_string(),
                Some("edited message"),
            ));
            return Ok(());
        }
    };

    if let Err(e) = state.messenger.send_html(channel, &html).await {
        warn!(channel_id = channel.0, error = %e, "Failed to send edit notice");
    }
    Ok(())
}

/// Notice for an edit of `message_id`, when that message carries the live count.
pub(crate) async fn edit_notice(
    game: &CountingGame,
    live: &LiveCounts,
    channel: ChannelId,
    message_id: MessageId,
    editor: Option<(UserId, String)>,
) -> Result<Option<String>> {
    let Some(counted) = live.lookup(channel, message_id).await else {
        return Ok(None);
    };
    let Some(notice) = game
        .retraction_notice(channel, counted.author, counted.count, RetractionKind::Edited)
        .await?
    else {
        return Ok(None);
    };

    let name = editor
        .filter(|(id, _)| *id == counted.author)
        .map(|(_, name)| name)
        .unwrap_or_else(|| "Someone".to_string());
    Ok(Some(render_retraction(
        &notice,
        &mention_html(counted.author, &name),
    )))
}
