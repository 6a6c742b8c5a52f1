use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer when dropped, so the caller
/// must hold it for the lifetime of the process.
pub fn init_logging(log_dir: impl AsRef<Path>) -> WorkerGuard {
    let log_dir = log_dir.as_ref();
    let _ = fs::create_dir_all(log_dir);

    // Daily rotated JSON log file
    let file_appender = tracing_appender::rolling::daily(log_dir, "pricelist_ingest.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pricelist_ingest=info"));

    // try_init so repeated calls (tests, embedding) do not panic
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}
