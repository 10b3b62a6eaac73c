//! The counting state machine.
//!
//! [`transition`] is the pure rule set; [`CountingGame`] applies it against a
//! [`CountingStore`] while holding the channel's lock, so the read of
//! `{count, contributor}` and the write-back happen as one step per channel.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    domain::{ChannelId, ChannelState, UserId},
    eval::{self, EvalError},
    highscore::{HighscoreEvent, HighscoreTracker},
    locks::ChannelLocks,
    store::CountingStore,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The author also sent the previous accepted number.
    SameContributor,
    WrongNumber { expected: i64 },
}

/// Result of feeding one message into the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not part of the game: unregistered channel or non-numeric text.
    Ignored,
    Accepted {
        new_count: i64,
    },
    Rejected {
        reason: RejectReason,
        lost_count: i64,
        highscore_event: HighscoreEvent,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Accept { next: ChannelState },
    Reject { reason: RejectReason, lost_count: i64 },
}

/// Decide what `value` from `author` does to `state`.
///
/// The same author twice in a row is rejected even with the right number.
pub fn transition(state: ChannelState, author: UserId, value: i64) -> Transition {
    if state.contributor == Some(author) {
        return Transition::Reject {
            reason: RejectReason::SameContributor,
            lost_count: state.count,
        };
    }

    let expected = state.expected_next();
    if value == expected {
        return Transition::Accept {
            next: ChannelState {
                count: value,
                contributor: Some(author),
            },
        };
    }

    Transition::Reject {
        reason: RejectReason::WrongNumber { expected },
        lost_count: state.count,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetractionKind {
    Deleted,
    Edited,
}

/// Advisory raised when the message holding the current count disappears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetractionNotice {
    pub kind: RetractionKind,
    pub author: UserId,
    pub current_count: i64,
}

/// Payload of the diagnostic evaluation command.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationReport {
    pub expression: String,
    pub value: f64,
    /// `None` when the value cannot be a count (out of range).
    pub rounded: Option<i64>,
}

/// Evaluate text for diagnostics, surfacing the error instead of ignoring it.
pub fn evaluate_standalone(raw_text: &str) -> std::result::Result<f64, EvalError> {
    eval::evaluate(raw_text)
}

pub fn evaluation_report(raw_text: &str) -> std::result::Result<EvaluationReport, EvalError> {
    let value = evaluate_standalone(raw_text)?;
    Ok(EvaluationReport {
        expression: raw_text.trim().to_string(),
        value,
        rounded: eval::round_to_count(value),
    })
}

pub struct CountingGame {
    store: Arc<dyn CountingStore>,
    highscores: HighscoreTracker,
    locks: ChannelLocks,
}

impl CountingGame {
    pub fn new(store: Arc<dyn CountingStore>, highscores: HighscoreTracker) -> Self {
        Self {
            store,
            highscores,
            locks: ChannelLocks::default(),
        }
    }

    pub fn highscores(&self) -> &HighscoreTracker {
        &self.highscores
    }

    /// Activate counting in a channel. `false` if it already was.
    pub async fn enable_channel(&self, channel: ChannelId) -> Result<bool> {
        let _guard = self.locks.lock(channel).await;
        let added = self.store.register_channel(channel).await?;
        info!(channel_id = channel.0, added, "Enable channel");
        Ok(added)
    }

    /// Deactivate counting in a channel. `false` if it was not active.
    pub async fn disable_channel(&self, channel: ChannelId) -> Result<bool> {
        let _guard = self.locks.lock(channel).await;
        let removed = self.store.unregister_channel(channel).await?;
        info!(channel_id = channel.0, removed, "Disable channel");
        Ok(removed)
    }

    /// Administrative highscore reset, ordered against the channel's counting.
    pub async fn reset_highscore(&self, channel: ChannelId) -> Result<()> {
        let _guard = self.locks.lock(channel).await;
        self.highscores.reset(channel).await
    }

    /// Feed one chat message into the game.
    ///
    /// Each decision is persisted with a single store write. On a store error
    /// nothing was written, the decision is dropped and the error returned.
    pub async fn handle_candidate_message(
        &self,
        channel: ChannelId,
        author: UserId,
        raw_text: &str,
    ) -> Result<Outcome> {
        if !self.store.channel_is_registered(channel).await? {
            return Ok(Outcome::Ignored);
        }

        let value = match eval::evaluate(raw_text) {
            Ok(v) => v,
            Err(e) => {
                debug!(channel_id = channel.0, error = %e, "Not a counting message");
                return Ok(Outcome::Ignored);
            }
        };
        let Some(value) = eval::round_to_count(value) else {
            debug!(channel_id = channel.0, value, "Value is not a representable count");
            return Ok(Outcome::Ignored);
        };

        let _guard = self.locks.lock(channel).await;

        // Re-read under the lock; the channel may have been disabled meanwhile.
        let Some(state) = self.store.get_channel_state(channel).await? else {
            return Ok(Outcome::Ignored);
        };

        info!(
            channel_id = channel.0,
            user_id = author.0,
            text = raw_text,
            value,
            count = state.count,
            "Counting message"
        );

        match transition(state, author, value) {
            Transition::Accept { next } => {
                self.store.accept_contribution(channel, next, author).await?;
                Ok(Outcome::Accepted {
                    new_count: next.count,
                })
            }
            Transition::Reject { reason, lost_count } => {
                let highscore_event = self.highscores.record_reset(channel, lost_count).await?;
                warn!(
                    channel_id = channel.0,
                    user_id = author.0,
                    ?reason,
                    lost_count,
                    "Count reset"
                );
                Ok(Outcome::Rejected {
                    reason,
                    lost_count,
                    highscore_event,
                })
            }
        }
    }

    /// Advisory for a deleted or edited message that carried `value`.
    ///
    /// Only the message holding the live count matters: the value must equal
    /// the persisted count and `author` must be the last contributor.
    pub async fn retraction_notice(
        &self,
        channel: ChannelId,
        author: UserId,
        value: i64,
        kind: RetractionKind,
    ) -> Result<Option<RetractionNotice>> {
        let Some(state) = self.store.get_channel_state(channel).await? else {
            return Ok(None);
        };
        if state.count == 0 || state.count != value || state.contributor != Some(author) {
            return Ok(None);
        }
        info!(
            channel_id = channel.0,
            user_id = author.0,
            count = state.count,
            ?kind,
            "Current count retracted"
        );
        Ok(Some(RetractionNotice {
            kind,
            author,
            current_count: state.count,
        }))
    }

    /// [`Self::retraction_notice`] for platforms that deliver the removed text.
    pub async fn retraction_notice_for_text(
        &self,
        channel: ChannelId,
        author: UserId,
        raw_text: &str,
        kind: RetractionKind,
    ) -> Result<Option<RetractionNotice>> {
        let Some(value) = eval::evaluate_count(raw_text) else {
            return Ok(None);
        };
        self.retraction_notice(channel, author, value, kind).await
    }
}
