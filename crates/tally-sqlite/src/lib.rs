//! SQLite persistence for the counting bot.
//!
//! All statements run on one dedicated connection thread (`tokio-rusqlite`),
//! so the tokio runtime never blocks on disk and writes execute in FIFO order.

mod error;
mod migrations;
mod queries;
mod store;

pub use error::{StoreError, StoreResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use store::SqliteStore;
