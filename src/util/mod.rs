//! Utility modules

pub mod paths;

pub use paths::{config_path, data_dir, init_data_dir, log_file_path, logs_dir, recordings_dir};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
