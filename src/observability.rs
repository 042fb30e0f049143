//! Logging setup for hosts that do not install their own subscriber.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "query-monitor.log";
const LOG_RETENTION_DAYS: u64 = 14;
const DEFAULT_FILTER: &str = "query_monitor=info";
const LOG_DIR_ENV: &str = "QUERYMONITOR_LOG_DIR";

/// Installs a JSON subscriber writing to a daily rolling file.
///
/// `RUST_LOG` overrides the default filter. Calling this when a global
/// subscriber already exists is a no-op. Without `log_dir`, files go to
/// `$QUERYMONITOR_LOG_DIR`, or `query-monitor/` under the temp directory.
///
/// ```no_run
/// use std::sync::Arc;
/// use query_monitor::{observability, MonitorConfig, QueryMonitor};
///
/// observability::init_tracing(None);
/// let monitor = Arc::new(QueryMonitor::with_tracing(MonitorConfig::default()));
/// # let _ = monitor;
/// ```
pub fn init_tracing(log_dir: Option<&Path>) {
    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(log_directory);
    let _ = fs::create_dir_all(&log_dir);

    if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(file_appender)
        .json()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Tracing initialized. Logs directory: {:?}", log_dir);
    }
}

fn log_directory() -> PathBuf {
    match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("query-monitor"),
    }
}

/// Removes rolled log files older than the retention window
fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention_duration = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();

        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if matches!(age, Some(age) if age > retention_duration) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_recent_logs() {
        let dir = tempfile::tempdir().unwrap();
        let recent = dir.path().join(format!("{}.2026-01-01", LOG_FILE_PREFIX));
        let other = dir.path().join("notes.txt");
        fs::write(&recent, "{}").unwrap();
        fs::write(&other, "keep").unwrap();

        let removed = cleanup_old_logs(dir.path(), LOG_RETENTION_DAYS).unwrap();
        assert_eq!(removed, 0);
        assert!(recent.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_cleanup_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cleanup_old_logs(&dir.path().join("absent"), 1).is_err());
    }

    #[test]
    fn test_default_log_directory() {
        let dir = log_directory();
        assert!(dir.is_absolute() || std::env::var_os(LOG_DIR_ENV).is_some());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        init_tracing(Some(dir.path()));
        init_tracing(Some(dir.path()));
    }
}
