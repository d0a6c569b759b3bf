//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from a directive such as `info` or `sunlink=debug,warn`.
pub fn filter(log_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(log_level).with_context(|| format!("Invalid log level '{}'", log_level))
}

/// Install the global subscriber. `log_level` is the effective level from
/// configuration, which already folds in `RUST_LOG` and `SUNNY_LOG_LEVEL`.
pub fn init(log_level: &str) -> Result<()> {
    let env_filter = filter(log_level)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
