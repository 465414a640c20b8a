//! Logging infrastructure for tilesource.
//!
//! Provides structured logging with file output and optional console output:
//! - Writes to `<directory>/tilesource.log` (cleared on session start)
//! - Mirrors to stderr so command output on stdout stays clean
//! - Configurable via RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging system.
///
/// Creates the log directory if needed, clears the previous log file and
/// installs the global subscriber. `default_level` is used when RUST_LOG
/// is unset.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or the log file
/// cannot be cleared.
pub fn init_logging(
    log_dir: &Path,
    log_file: &str,
    default_level: &str,
    console: bool,
) -> Result<LoggingGuard, io::Error> {
    let log_path = prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE);

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
    });

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(path = %log_path.display(), "Logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Creates the directory and truncates the log file.
fn prepare_log_file(log_dir: &Path, log_file: &str) -> Result<std::path::PathBuf, io::Error> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(log_file);
    fs::write(&log_path, "")?;
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // init_logging installs a global subscriber, so only the file
    // preparation is tested here.

    #[test]
    fn test_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");

        let path = prepare_log_file(&log_dir, "test.log").unwrap();

        assert!(log_dir.exists());
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn test_clears_existing_file() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("test.log");
        fs::write(&log_path, "old log data").unwrap();

        prepare_log_file(dir.path(), "test.log").unwrap();

        assert_eq!(fs::read_to_string(log_path).unwrap(), "");
    }
}
