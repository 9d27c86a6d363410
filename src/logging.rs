use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` wins over the verbosity flag.
///
/// stdout carries results only, so diagnostics never go there.
pub fn init(verbosity: u8) -> Result<()> {
    let fallback = match verbosity {
        0 => "certscan_rs=warn",
        1 => "certscan_rs=info",
        2 => "certscan_rs=debug",
        _ => "certscan_rs=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}
