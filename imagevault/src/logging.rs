//! Logging infrastructure for ImageVault.
//!
//! Provides structured logging with dual output:
//! - Writes to `<log_dir>/<log_file>` for operator diagnosis
//! - Also prints to stdout for interactive use
//! - Configurable via the RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the logging system.
///
/// Creates the log directory if needed and sets up dual output to both
/// the log file and stdout. The filter defaults to INFO when RUST_LOG is
/// not set.
///
/// # Arguments
///
/// * `log_dir` - Directory for log files (e.g., "logs")
/// * `log_file` - Log filename (e.g., "imagevault.log")
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init_logging(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    // Truncate the previous session's log file
    let log_path = Path::new(log_dir).join(log_file);
    fs::write(&log_path, "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init so embedding applications (and tests) that already installed
    // a subscriber keep their own; file side effects still apply.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .ok();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_logging_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let log_dir = tmp.path().join("logs");

        // Note: init can only install a global subscriber once per process,
        // so this test may race with others that initialize logging. We only
        // assert on the filesystem side effects.
        let _ = init_logging(log_dir.to_str().unwrap(), "imagevault.log");

        assert!(log_dir.exists());
        assert!(log_dir.join("imagevault.log").exists());
    }
}
