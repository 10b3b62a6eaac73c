//! Core rules and application logic for the counting bot.
//!
//! This crate is framework-agnostic. The chat platform and persistence live
//! behind ports (`MessagingPort`, `CountingStore`) implemented in adapter crates.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod eval;
pub mod formatting;
pub mod game;
pub mod highscore;
pub mod leaderboard;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod permissions;
pub mod store;

pub use errors::{Error, Result};
