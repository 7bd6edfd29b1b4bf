use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level; `verbose` raises the fallback
/// to `debug`. Thread names are always included because they carry the
/// worker ids.
pub fn init_tracing(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let fallback = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let (pretty, json) = match config.format {
        LogFormat::Pretty => (Some(fmt::layer().with_thread_names(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_thread_names(true))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
