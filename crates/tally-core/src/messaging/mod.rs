//! Outbound chat abstraction. Telegram is the only adapter today.

pub mod port;
pub mod throttled;

pub use port::MessagingPort;
pub use throttled::{ThrottleConfig, ThrottledMessenger};
