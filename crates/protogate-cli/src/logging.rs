//! tracing subscriber setup

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "protogate=info";

pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| anyhow!(e))
}
