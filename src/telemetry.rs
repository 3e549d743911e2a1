//! Tracing subscriber setup for the server binary.
//!
//! The subscriber is built from [`Config`] and installed once by `main`;
//! library modules only emit events and spans.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Config;

/// Install the global subscriber: stdout (pretty in development, JSON otherwise)
/// plus a daily rolling `app.log` under `config.log_dir`.
///
/// Keep the returned guard alive for the lifetime of the process or buffered
/// file output is lost.
pub fn init(config: &Config) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "app.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = if config.is_development() {
        fmt::layer().pretty().boxed()
    } else {
        fmt::layer().json().with_current_span(true).boxed()
    };

    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
