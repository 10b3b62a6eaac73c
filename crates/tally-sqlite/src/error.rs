//! Storage error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection thread is gone or could not be started.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("channel {0} is not registered")]
    ChannelNotRegistered(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for tally_core::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ChannelNotRegistered(id) => {
                tally_core::Error::ChannelNotRegistered(tally_core::domain::ChannelId(id))
            }
            other => tally_core::Error::Persistence(other.to_string()),
        }
    }
}
