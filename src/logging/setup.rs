use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::formatter::BracketedFormatter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Platform data directory for logs, or `./logs` when none is available.
pub fn default_log_dir() -> PathBuf {
    ProjectDirs::from("", "", "yolo-dataset-balancer")
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

pub fn log_file_name() -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("dataset_balancer_{}.log", timestamp)
}

/// Install the global subscriber writing to stdout and a timestamped log file.
/// Returns the log file path.
pub fn setup_logging(log_dir: Option<&Path>) -> io::Result<PathBuf> {
    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(log_file_name());
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    let file_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    let stdout_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    info!("Starting YOLO dataset balancer");
    info!("Log file created at: {:?}", log_path);

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_format() {
        let name = log_file_name();
        assert!(name.starts_with("dataset_balancer_"));
        assert!(name.ends_with(".log"));
        // dataset_balancer_ + YYYYmmdd_HHMMSS + .log
        assert_eq!(name.len(), "dataset_balancer_".len() + 15 + 4);
    }

    #[test]
    fn test_default_log_dir_ends_in_logs() {
        assert!(default_log_dir().ends_with("logs"));
    }
}
