use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `fmt` subscriber for the host application.
///
/// `RUST_LOG` takes precedence over `default_filter` (e.g. `"photofeed=info"`).
pub fn init(default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
