//! Configuration loading for Wallflower.
//!
//! Small on purpose: one struct, per-field serde defaults, layered file
//! loading with environment overrides on top. Designed to be imported by
//! the server binary without dragging anything else along.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/wallflower/config.toml` (system)
//! 2. `~/.config/wallflower/config.toml` (user)
//! 3. `./wallflower.toml` (local override)
//! 4. Environment variables (`WALLFLOWER_*`)
//!
//! # Example Config
//!
//! ```toml
//! [bind]
//! http_port = 8090
//!
//! [engine]
//! gap_threshold = 5
//! cache_capacity = 256
//! debounce_ms = 50
//!
//! [telemetry]
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {var}: {message}")]
    EnvOverride { var: String, message: String },
}

/// Network bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// HTTP port for the event intake and WebSocket stream.
    /// Default: 8090
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,

    /// Bind address. Default: 127.0.0.1
    #[serde(default = "BindConfig::default_host")]
    pub host: String,
}

impl BindConfig {
    fn default_http_port() -> u16 {
        8090
    }

    fn default_host() -> String {
        "127.0.0.1".to_string()
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            http_port: Self::default_http_port(),
            host: Self::default_host(),
        }
    }
}

/// Tree-engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sequence-gap size that marks the tree stale and forces a reload.
    /// Default: 5
    #[serde(default = "EngineConfig::default_gap_threshold")]
    pub gap_threshold: u64,

    /// Capacity of the positional node-lookup cache.
    /// Default: 256
    #[serde(default = "EngineConfig::default_cache_capacity")]
    pub cache_capacity: usize,

    /// Broadcaster debounce window for state events, in milliseconds.
    /// Default: 50
    #[serde(default = "EngineConfig::default_debounce_ms")]
    pub debounce_ms: u64,
}

impl EngineConfig {
    fn default_gap_threshold() -> u64 {
        5
    }

    fn default_cache_capacity() -> usize {
        256
    }

    fn default_debounce_ms() -> u64 {
        50
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gap_threshold: Self::default_gap_threshold(),
            cache_capacity: Self::default_cache_capacity(),
            debounce_ms: Self::default_debounce_ms(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error). Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Complete Wallflower configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WallConfig {
    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl WallConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with an explicit file taking the place of the
    /// local `./wallflower.toml` override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = WallConfig::default();
        // Later files win wholesale; serde defaults fill whatever a
        // partial file leaves out.
        for path in discover_config_files(config_path) {
            config = load_file(&path)?;
        }
        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

fn discover_config_files(config_path: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    let system = PathBuf::from("/etc/wallflower/config.toml");
    if system.is_file() {
        paths.push(system);
    }

    if let Some(dirs) = directories::BaseDirs::new() {
        let user = dirs.config_dir().join("wallflower/config.toml");
        if user.is_file() {
            paths.push(user);
        }
    }

    match config_path {
        Some(path) => paths.push(path.to_path_buf()),
        None => {
            let local = PathBuf::from("wallflower.toml");
            if local.is_file() {
                paths.push(local);
            }
        }
    }

    paths
}

fn load_file(path: &Path) -> Result<WallConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn apply_env_overrides(config: &mut WallConfig) -> Result<(), ConfigError> {
    if let Ok(port) = std::env::var("WALLFLOWER_HTTP_PORT") {
        config.bind.http_port = parse_env("WALLFLOWER_HTTP_PORT", &port)?;
    }
    if let Ok(host) = std::env::var("WALLFLOWER_HOST") {
        config.bind.host = host;
    }
    if let Ok(threshold) = std::env::var("WALLFLOWER_GAP_THRESHOLD") {
        config.engine.gap_threshold = parse_env("WALLFLOWER_GAP_THRESHOLD", &threshold)?;
    }
    if let Ok(capacity) = std::env::var("WALLFLOWER_CACHE_CAPACITY") {
        config.engine.cache_capacity = parse_env("WALLFLOWER_CACHE_CAPACITY", &capacity)?;
    }
    if let Ok(debounce) = std::env::var("WALLFLOWER_DEBOUNCE_MS") {
        config.engine.debounce_ms = parse_env("WALLFLOWER_DEBOUNCE_MS", &debounce)?;
    }
    if let Ok(level) = std::env::var("WALLFLOWER_LOG_LEVEL") {
        config.telemetry.log_level = level;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::EnvOverride {
        var: var.to_string(),
        message: e.to_string(),
    })
}
