//! Configuration system
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub write_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_timeout(),
            idle_timeout_secs: default_timeout(),
            write_timeout_secs: default_timeout(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Whisper store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_root")]
    pub data_root: String,

    #[serde(default = "default_max_globs")]
    pub max_globs: usize,

    /// Seconds between index walks; 0 disables the builder.
    #[serde(default = "default_scan_frequency")]
    pub scan_frequency_secs: u64,
}

fn default_data_root() -> String {
    "./whisper".to_string()
}

fn default_max_globs() -> usize {
    100
}

fn default_scan_frequency() -> u64 {
    300
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            max_globs: default_max_globs(),
            scan_frequency_secs: default_scan_frequency(),
        }
    }
}

impl StoreConfig {
    /// Data root with any trailing slashes stripped.
    pub fn data_root(&self) -> PathBuf {
        PathBuf::from(self.data_root.trim_end_matches('/'))
    }

    pub fn scan_frequency(&self) -> Duration {
        Duration::from_secs(self.scan_frequency_secs)
    }
}

/// Counter emission configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_buckets")]
    pub buckets: usize,

    /// true emits cumulative counter values, false emits deltas.
    #[serde(default)]
    pub metrics_as_counters: bool,
}

fn default_buckets() -> usize {
    10
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            buckets: default_buckets(),
            metrics_as_counters: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            PathBuf::from("/etc/granary/granary.toml"),
            PathBuf::from("./granary.toml"),
        ];

        for path in &config_paths {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load config");
                    }
                }
            }
        }

        tracing::info!("using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_root) = std::env::var("GRANARY_DATA_ROOT") {
            self.store.data_root = data_root;
        }
        if let Ok(host) = std::env::var("GRANARY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GRANARY_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(freq) = std::env::var("GRANARY_SCAN_FREQUENCY_SECS") {
            if let Ok(f) = freq.parse() {
                self.store.scan_frequency_secs = f;
            }
        }
        if let Ok(level) = std::env::var("GRANARY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("GRANARY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.addr(), "0.0.0.0:8080");
        assert_eq!(config.store.max_globs, 100);
        assert_eq!(config.store.scan_frequency(), Duration::from_secs(300));
        assert_eq!(config.stats.buckets, 10);
        assert!(!config.stats.metrics_as_counters);
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 9090

[store]
data_root = "/data/whisper/"
max_globs = 50
scan_frequency_secs = 0

[stats]
buckets = 5
metrics_as_counters = true
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.store.max_globs, 50);
        assert!(config.store.scan_frequency().is_zero());
        assert_eq!(config.stats.buckets, 5);
        assert!(config.stats.metrics_as_counters);
    }

    #[test]
    fn test_data_root_strips_trailing_slash() {
        let config = StoreConfig {
            data_root: "/data/whisper///".to_string(),
            ..Default::default()
        };
        assert_eq!(config.data_root(), PathBuf::from("/data/whisper"));
    }

    #[test]
    fn test_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not = [valid").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
