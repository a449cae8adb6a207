//! Tracing subscriber setup for the binary.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// chromiumoxide logs every CDP message it cannot decode; keep it quiet.
const QUIET_TARGETS: &str = "chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off";

fn default_filter(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    format!("{level},{QUIET_TARGETS}")
}

/// Install the global subscriber. `RUST_LOG` overrides the level.
pub fn init_logging(debug: bool, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(debug)
        .with_level(true);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    }
    .map_err(|e| anyhow!("Failed to initialise logging: {e}"))
}
