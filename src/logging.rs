//! Tracing setup for the binary.
use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "meg_explorer=info";

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, or by `default`
/// when the variable is absent.  Fails if a subscriber is already set.
pub fn init(default: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| anyhow!("install tracing subscriber: {e}"))
}
