use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_ENV: &str = "SHELFKEEPER_LOG";
const DEFAULT_FILTER: &str = "shelfkeeper=info,sqlx=warn";
const LOG_FILE_PREFIX: &str = "shelfkeeper.log";

fn env_filter() -> EnvFilter {
    EnvFilter::new(std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into()))
}

/// Install the JSON subscriber on stderr, leaving stdout to command output.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
    // No-op when the subscriber already bridged `log` records.
    let _ = tracing_log::LogTracer::init();
}

/// Install stderr plus a daily-rolling JSON file sink under `log_dir`.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging_with_file(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let console = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .with_filter(env_filter());
    let file = fmt::layer()
        .json()
        .with_target(true)
        .with_ansi(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("install tracing subscriber")?;
    let _ = tracing_log::LogTracer::init();

    Ok(guard)
}
