//! Locations under the axscope data directory.
//!
//! The directory resolves from `--data-dir`, then `AXSCOPE_DATA_DIR`, then
//! `~/.axscope`. Everything else (logs, recordings, config) lives below it.

use std::path::PathBuf;
use std::sync::OnceLock;

const DATA_DIR_ENV: &str = "AXSCOPE_DATA_DIR";

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Pin the data directory for the rest of the process. Call once, early in
/// `main`; later calls are ignored.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let resolved = custom_path
        .or_else(env_data_dir)
        .unwrap_or_else(home_data_dir);
    if let Err(rejected) = DATA_DIR.set(resolved) {
        tracing::debug!(
            rejected = %rejected.display(),
            kept = %data_dir().display(),
            "data directory already initialized"
        );
    }
}

fn env_data_dir() -> Option<PathBuf> {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn home_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".axscope"),
        None => PathBuf::from(".axscope"),
    }
}

pub fn data_dir() -> PathBuf {
    match DATA_DIR.get() {
        Some(dir) => dir.clone(),
        None => env_data_dir().unwrap_or_else(home_data_dir),
    }
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("axscope.log")
}

/// Autosave target for stopped recordings.
pub fn recordings_dir() -> PathBuf {
    data_dir().join("recordings")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
