use hoarder_core::config::{LogConfig, LogEncoding};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// ## Summary
/// Parses the configured level, e.g. `info` or `hoarder_service=debug,warn`.
///
/// ## Errors
/// Returns an error if a directive does not parse.
pub fn filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_new(level)?)
}

/// ## Summary
/// Installs the global subscriber: text or JSON lines on stdout, with source locations when
/// `add_source` is set.
///
/// ## Errors
/// Returns an error for an invalid level or when a subscriber is already installed.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let source = config.add_source;
    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.encoding {
        LogEncoding::Text => fmt::layer()
            .with_target(true)
            .with_file(source)
            .with_line_number(source)
            .boxed(),
        LogEncoding::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_file(source)
            .with_line_number(source)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter(&config.level)?)
        .try_init()?;
    Ok(())
}
