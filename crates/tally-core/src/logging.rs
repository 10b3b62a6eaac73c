use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the bot.
///
/// Default: info for our crates, warn for everything else. Override with `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tally_core=info,tally_sqlite=info,tally_telegram=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("logging init failed: {e}")))
}
