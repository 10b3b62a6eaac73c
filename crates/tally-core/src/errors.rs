use crate::{domain::ChannelId, eval::EvalError};

/// Core error type for the counting bot.
///
/// Adapter crates map their specific errors into this type so the handlers
/// can tell a user-facing failure (unregistered channel, bad expression)
/// from an infrastructure one (persistence, chat API).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("channel {0} is not registered for counting")]
    ChannelNotRegistered(ChannelId),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
