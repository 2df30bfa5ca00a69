//! Logging setup.
//!
//! Log records go to a daily-rotated `vitabundle.log` in the log directory
//! through a non-blocking writer. The filter comes from `RUST_LOG` when set.

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file name prefix.
pub const LOG_FILE: &str = "vitabundle.log";

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "vitabundle=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber writing to `log_dir`.
///
/// The returned guard flushes pending records when dropped and must be kept
/// alive for as long as logging is wanted.
///
/// # Errors
///
/// Fails when the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(log_dir: &Path, verbose: bool) -> io::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339()),
        )
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(guard)
}
