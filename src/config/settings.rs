use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::playback::PlaybackConfig;
use crate::recorder::RecorderConfig;
use crate::sync::ObserverConfig;
use crate::util::paths::{config_path, recordings_dir};
use crate::web::ServerConfig;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Sync server binding and endpoint path
    pub server: ServerConfig,
    /// Recording session limits
    pub recorder: RecorderConfig,
    /// Directory stopped recordings are written to (None = don't save)
    pub autosave_dir: Option<PathBuf>,
    /// Auto-play pacing
    pub playback: PlaybackConfig,
    /// Capture polling and status heartbeat
    pub capture: CaptureConfig,
    /// Observer client settings
    pub observer: ObserverConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Interval of the fallback poll of the capture source
    pub poll_interval: Duration,
    /// Interval of `recordingStatus` broadcasts while recording
    pub heartbeat_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_millis(1000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerConfig::default();
        let observer = ObserverConfig {
            url: format!("ws://{}:{}{}", server.host, server.port, server.ws_path),
            ..ObserverConfig::default()
        };
        Self {
            server,
            recorder: RecorderConfig::default(),
            autosave_dir: Some(recordings_dir()),
            playback: PlaybackConfig::default(),
            capture: CaptureConfig::default(),
            observer,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ws_path: Option<String>,
    pub cors_permissive: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlRecorderConfig {
    pub max_timeline_entries: Option<usize>,
    pub rebaseline_on_evict: Option<bool>,
    pub autosave: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlPlaybackConfig {
    pub min_step_delay_ms: Option<u64>,
    pub default_speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlCaptureConfig {
    pub poll_interval_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlObserverConfig {
    pub url: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
}

/// On-disk shape of `config.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub server: Option<TomlServerConfig>,
    pub recorder: Option<TomlRecorderConfig>,
    pub playback: Option<TomlPlaybackConfig>,
    pub capture: Option<TomlCaptureConfig>,
    pub observer: Option<TomlObserverConfig>,
}

impl Config {
    /// Load from the default config path, creating the example file on first
    /// run. Unreadable or invalid files fall back to defaults with a warning.
    pub fn load() -> Self {
        let config_file = config_path();

        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        match Self::load_from(&config_file) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %config_file.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );
                Config::default()
            }
        }
    }

    /// Load from an explicit path. Errors are returned, not swallowed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let toml_config: TomlConfig = toml::from_str(contents)?;
        let mut config = Config::default();
        config.merge(toml_config);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        // Load server configuration
        if let Some(server) = toml_config.server {
            if let Some(host) = server.host {
                self.server.host = host;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(ws_path) = server.ws_path {
                self.server.ws_path = if ws_path.starts_with('/') {
                    ws_path
                } else {
                    format!("/{ws_path}")
                };
            }
            if let Some(cors_permissive) = server.cors_permissive {
                self.server.cors_permissive = cors_permissive;
            }
            self.observer.url = format!(
                "ws://{}:{}{}",
                self.server.host, self.server.port, self.server.ws_path
            );
        }

        // Load recorder configuration
        if let Some(recorder) = toml_config.recorder {
            if let Some(max) = recorder.max_timeline_entries {
                self.recorder.max_timeline_entries = max.max(1);
            }
            if let Some(rebaseline) = recorder.rebaseline_on_evict {
                self.recorder.rebaseline_on_evict = rebaseline;
            }
            if recorder.autosave == Some(false) {
                self.autosave_dir = None;
            }
        }

        // Load playback configuration
        if let Some(playback) = toml_config.playback {
            if let Some(ms) = playback.min_step_delay_ms {
                self.playback.min_step_delay = Duration::from_millis(ms);
            }
            if let Some(speed) = playback.default_speed {
                if speed.is_finite() && speed > 0.0 {
                    self.playback.speed = speed;
                } else {
                    tracing::warn!(speed, "Ignoring non-positive default_speed");
                }
            }
        }

        // Load capture configuration
        if let Some(capture) = toml_config.capture {
            if let Some(ms) = capture.poll_interval_ms {
                self.capture.poll_interval = Duration::from_millis(ms.max(1));
            }
            if let Some(ms) = capture.heartbeat_interval_ms {
                self.capture.heartbeat_interval = Duration::from_millis(ms.max(1));
            }
        }

        // Load observer configuration (explicit url wins over the derived one)
        if let Some(observer) = toml_config.observer {
            if let Some(url) = observer.url {
                self.observer.url = url;
            }
            if let Some(ms) = observer.reconnect_delay_ms {
                self.observer.reconnect_delay = Duration::from_millis(ms);
            }
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }
}
