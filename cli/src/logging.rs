use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Log to stderr at `warn`, `info` or `debug` by verbosity; `RUST_LOG` wins when set.
pub fn init(verbose: u8) -> Result<()> {
    let base_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(base_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("logger initialization failed: {e}"))
}
