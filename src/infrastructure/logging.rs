//! Logging setup
//!
//! Console output plus rolling daily files under logs/:
//! - logs/arbscan.log - all records at the configured level
//! - logs/error.log - WARN and above only
//!
//! The returned guards must stay alive for the duration of the process or
//! buffered records are lost.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initialize the global subscriber; `level` comes from `LOG_LEVEL`
pub fn init_logging(level: &str) -> Vec<WorkerGuard> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (main_writer, main_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        "logs",
        "arbscan.log",
    ));
    let (error_writer, error_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        "logs",
        "error.log",
    ));

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(main_writer)
        .with_ansi(false)
        .with_target(true);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let console_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(main_layer)
        .with(error_layer)
        .with(console_layer)
        .init();

    vec![main_guard, error_guard]
}
