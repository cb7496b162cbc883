use tracing::debug;
use tracing_subscriber::EnvFilter;
use tundns_domain::LoggingConfig;

/// Installs the global `tracing` subscriber. `RUST_LOG` takes precedence
/// over the configured level. A subscriber installed earlier is kept.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = installed {
        debug!(error = %e, "Global tracing subscriber already installed");
    }
}
