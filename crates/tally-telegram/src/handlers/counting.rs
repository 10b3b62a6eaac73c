use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, warn};

use tally_core::{
    audit::AuditEvent,
    domain::MessageRef,
    formatting::{render_highscore_event, render_rejection},
    game::Outcome,
    messaging::MessagingPort,
    Result,
};

use super::{channel_of, failure_html, message_ref, user_id_of};
use crate::{router::AppState, tracking::CountedMessage};

/// Emojis used to acknowledge counting messages.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Reactions<'a> {
    pub positive: &'a str,
    pub negative: &'a str,
}

/// Feed a plain text message into the game and acknowledge the outcome.
pub async fn handle_count(msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };
    let channel = channel_of(msg);
    let author = user_id_of(user);
    let username = user.username.clone().unwrap_or_default();
    let target = message_ref(msg);

    let result = state
        .game
        .handle_candidate_message(channel, author, text)
        .await;

    let audit_event = match &result {
        Ok(Outcome::Ignored) => None,
        Ok(Outcome::Accepted { new_count }) => {
            state
                .live_counts
                .remember(
                    channel,
                    CountedMessage {
                        message_id: target.message_id,
                        author,
                        count: *new_count,
                    },
                )
                .await;
            Some(AuditEvent::count(
                channel,
                author,
                &username,
                text,
                &format!("accepted {new_count}"),
            ))
        }
        Ok(Outcome::Rejected {
            reason, lost_count, ..
        }) => {
            state.live_counts.forget(channel).await;
            Some(AuditEvent::count(
                channel,
                author,
                &username,
                text,
                &format!("rejected {reason:?} after {lost_count}"),
            ))
        }
        Err(e) => {
            error!(channel_id = channel.0, user_id = author.0, error = %e, "Counting failed");
            Some(AuditEvent::error(
                channel,
                Some(author),
                &username,
                &e.to_string(),
                Some(text),
            ))
        }
    };

    let reactions = Reactions {
        positive: &state.cfg.positive_emoji,
        negative: &state.cfg.negative_emoji,
    };
    acknowledge(state.messenger.as_ref(), reactions, target, &result).await;

    if let Some(event) = audit_event {
        state.audit(event);
    }
    Ok(())
}

/// Tell the channel what became of `target`.
///
/// Outbound failures are logged; they never undo a persisted decision.
pub(crate) async fn acknowledge(
    messenger: &dyn MessagingPort,
    reactions: Reactions<'_>,
    target: MessageRef,
    result: &Result<Outcome>,
) {
    match result {
        Ok(Outcome::Ignored) => {}
        Ok(Outcome::Accepted { .. }) => {
            report(messenger.set_reaction(target, reactions.positive).await);
        }
        Ok(Outcome::Rejected {
            reason,
            highscore_event,
            ..
        }) => {
            report(messenger.set_reaction(target, reactions.negative).await);
            report(
                messenger
                    .reply_html(target, &render_rejection(*reason))
                    .await
                    .map(|_| ()),
            );
            report(
                messenger
                    .send_html(target.channel_id, &render_highscore_event(*highscore_event))
                    .await
                    .map(|_| ()),
            );
        }
        Err(_) => {
            report(
                messenger
                    .reply_html(target, &failure_html())
                    .await
                    .map(|_| ()),
            );
        }
    }
}

fn report(res: Result<()>) {
    if let Err(e) = res {
        warn!(error = %e, "Failed to deliver game notice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tally_core::{
        domain::{ChannelId, MessageId},
        game::RejectReason,
        highscore::HighscoreEvent,
        Error,
    };
    use tokio::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Sent {
        Html(ChannelId, String),
        Reply(MessageRef, String),
        Reaction(MessageRef, String),
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingMessenger {
        async fn sent(&self) -> Vec<Sent> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_html(&self, channel: ChannelId, html: &str) -> Result<MessageRef> {
            self.sent
                .lock()
                .await
                .push(Sent::Html(channel, html.to_string()));
            Ok(MessageRef {
                channel_id: channel,
                message_id: MessageId(100),
            })
        }

        async fn reply_html(&self, msg: MessageRef, html: &str) -> Result<MessageRef> {
            self.sent.lock().await.push(Sent::Reply(msg, html.to_string()));
            Ok(MessageRef {
                channel_id: msg.channel_id,
                message_id: MessageId(101),
            })
        }

        async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
            self.sent
                .lock()
                .await
                .push(Sent::Reaction(msg, emoji.to_string()));
            Ok(())
        }
    }

    const REACTIONS: Reactions<'static> = Reactions {
        positive: "✅",
        negative: "❌",
    };

    const TARGET: MessageRef = MessageRef {
        channel_id: ChannelId(-100),
        message_id: MessageId(7),
    };

    #[tokio::test]
    async fn accepted_count_only_gets_the_positive_reaction() {
        let messenger = RecordingMessenger::default();
        acknowledge(
            &messenger,
            REACTIONS,
            TARGET,
            &Ok(Outcome::Accepted { new_count: 3 }),
        )
        .await;
        assert_eq!(
            messenger.sent().await,
            vec![Sent::Reaction(TARGET, "✅".to_string())]
        );
    }

    #[tokio::test]
    async fn rejected_count_explains_and_reports_highscore() {
        let messenger = RecordingMessenger::default();
        let reason = RejectReason::WrongNumber { expected: 6 };
        let event = HighscoreEvent::NewHighscore { highscore: 5 };
        acknowledge(
            &messenger,
            REACTIONS,
            TARGET,
            &Ok(Outcome::Rejected {
                reason,
                lost_count: 5,
                highscore_event: event,
            }),
        )
        .await;
        assert_eq!(
            messenger.sent().await,
            vec![
                Sent::Reaction(TARGET, "❌".to_string()),
                Sent::Reply(TARGET, render_rejection(reason)),
                Sent::Html(TARGET.channel_id, render_highscore_event(event)),
            ]
        );
    }

    #[tokio::test]
    async fn failure_gets_a_generic_reply_only() {
        let messenger = RecordingMessenger::default();
        acknowledge(
            &messenger,
            REACTIONS,
            TARGET,
            &Err(Error::Persistence("disk full".to_string())),
        )
        .await;
        let sent = messenger.sent().await;
        assert_eq!(sent, vec![Sent::Reply(TARGET, failure_html())]);
        assert!(!failure_html().contains("disk full"));
    }

    #[tokio::test]
    async fn ignored_message_gets_nothing() {
        let messenger = RecordingMessenger::default();
        acknowledge(&messenger, REACTIONS, TARGET, &Ok(Outcome::Ignored)).await;
        assert!(messenger.sent().await.is_empty());
    }
}
