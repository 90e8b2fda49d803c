//! Console logging setup
//!
//! `RUST_LOG` controls the level; `info` when unset. Output goes to stderr so
//! it never mixes with the output of `inspect` or the supervised command.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const DEFAULT_LEVEL: &str = "info";

pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { DEFAULT_LEVEL })
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);

    Registry::default()
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
