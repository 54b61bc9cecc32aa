//! Tracing initialization.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level` when it holds a valid filter
/// (`RUST_LOG=soh_engine=debug,info`). `json` switches to one JSON object per
/// line.
pub fn init(level: &str, json: bool) -> Result<()> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(from_env.as_deref(), level)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder
            .json()
            .with_thread_ids(true)
            .try_init()
            .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
    } else {
        builder.try_init().map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
    }
}

fn build_filter(from_env: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(directives) = from_env.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return Ok(filter),
            Err(err) => eprintln!("ignoring invalid {}: {err}", EnvFilter::DEFAULT_ENV),
        }
    }
    EnvFilter::try_new(level).map_err(|err| anyhow!("invalid log level {level:?}: {err}"))
}
