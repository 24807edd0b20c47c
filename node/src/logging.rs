//! Tracing setup for the node binary. Output goes to stderr.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Selected with `--log-format` / `VAULTPAY_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `filter` (`--log-level`) when set, e.g.
/// `RUST_LOG=vaultpay_contracts=debug,tower_http=debug`.
pub fn init_logging(filter: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_file(true).with_line_number(true))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
    }

    tracing::debug!(?format, "logging initialized");
}
