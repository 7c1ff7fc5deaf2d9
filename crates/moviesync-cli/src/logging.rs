//! Logging setup for the moviesync binary.

use tracing_subscriber::EnvFilter;

/// Initialize the compact fmt subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise the `--log-level` flag
/// applies across the pipeline while the HTTP client internals stay at
/// `warn` so cycle narration isn't drowned out.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{log_level},hyper=warn,hyper_util=warn,reqwest=warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
