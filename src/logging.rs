//! Tracing subscriber setup: console plus optional daily-rolling file.

use crate::error::{Result, TeliumError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_FILTER: &str = "info,telium_manager=debug";
const LOG_FILE_PREFIX: &str = "telium";
const MAX_LOG_FILES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Emit console lines as JSON objects.
    pub json: bool,
    /// Also write daily log files here.
    pub log_dir: Option<PathBuf>,
}

/// Per-user log directory, e.g. `~/.local/share/telium/logs`.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        });
    base.join("telium").join("logs")
}

/// Install the global subscriber. `RUST_LOG` overrides [`DEFAULT_FILTER`].
///
/// Hold the returned guard until exit; dropping it flushes the file writer.
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // stdout is reserved for command output.
    let console_layer = if options.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            prune_old_logs(dir, MAX_LOG_FILES);
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TeliumError::Config(format!("logging already initialised: {e}")))?;

    Ok(guard)
}

/// Keep only the `keep` most recent log files in `dir`.
pub fn prune_old_logs(dir: &Path, keep: usize) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .map(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (e.path(), modified)
        })
        .filter(|(path, _)| path.is_file())
        .collect();

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(keep) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("telium-logs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = scratch_dir();
        let now = SystemTime::now();
        for day in 0..5u64 {
            let path = dir.join(format!("{LOG_FILE_PREFIX}.2026-10-0{}", day + 1));
            let file = fs::File::create(&path).unwrap();
            file.set_modified(now - Duration::from_secs(86_400 * (5 - day)))
                .unwrap();
        }
        fs::write(dir.join("unrelated.txt"), "keep me").unwrap();

        prune_old_logs(&dir, 2);

        let mut left: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            ["telium.2026-10-04", "telium.2026-10-05", "unrelated.txt"]
        );
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        prune_old_logs(Path::new("/nonexistent/telium/logs"), 1);
    }

    #[test]
    fn test_default_log_dir_ends_with_app_name() {
        assert!(default_log_dir().ends_with("telium/logs"));
    }
}
