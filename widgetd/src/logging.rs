//! Logging configuration for the widgetd process (via CLI arguments and
//! environment variables).

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI block controlling log filtering and destination.
#[derive(Debug, clap::Parser)]
pub(crate) struct LoggingConfig {
    /// Tracing filter directive, e.g. "info" or "widgetd_consumer=debug"
    #[clap(
        long = "log-filter",
        env = "LOG_FILTER",
        default_value = "info",
        action
    )]
    pub(crate) log_filter: String,

    /// Append log lines to this file instead of writing them to stderr
    #[clap(long = "log-file", env = "WIDGETD_LOG_FILE", action)]
    pub(crate) log_file: Option<PathBuf>,
}

pub(crate) fn init(config: &LoggingConfig) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_new(&config.log_filter)?;
    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .try_init()?;
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
    }
    Ok(())
}
