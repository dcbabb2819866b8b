//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::query::OutputFormat;
use crate::storage::{StoreConfig, Zone};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub query: QuerySettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory holding the exports; the working directory when unset
    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// `local`, `utc`, or a fixed offset such as `+02:00`
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,

    /// Drop records stamped in local hour 1 from range reads
    #[serde(default = "default_exclude_hour_one")]
    pub exclude_hour_one: bool,
}

fn default_file_prefix() -> String {
    "HealthMetrics".to_string()
}

fn default_file_extension() -> String {
    "csv".to_string()
}

fn default_cache_size() -> usize {
    50
}

fn default_cache_enabled() -> bool {
    true
}

fn default_utc_offset() -> String {
    "local".to_string()
}

fn default_exclude_hour_one() -> bool {
    true
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_prefix: default_file_prefix(),
            file_extension: default_file_extension(),
            cache_size: default_cache_size(),
            cache_enabled: default_cache_enabled(),
            utc_offset: default_utc_offset(),
            exclude_hour_one: default_exclude_hour_one(),
        }
    }
}

impl StorageSettings {
    /// Resolve into a store configuration
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        let zone = Zone::parse(&self.utc_offset).ok_or_else(|| ConfigError::Invalid {
            key: "storage.utc_offset".to_string(),
            value: self.utc_offset.clone(),
        })?;

        let mut config = match &self.data_dir {
            Some(dir) => StoreConfig::new(dir),
            None => StoreConfig::default(),
        };
        config.file_prefix = self.file_prefix.clone();
        config.file_extension = self.file_extension.clone();
        config.cache_size = self.cache_size;
        config.cache_enabled = self.cache_enabled;
        config.zone = zone;
        config.excluded_hour = self.exclude_hour_one.then_some(1);
        Ok(config)
    }
}

/// Query engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySettings {
    /// Output shape used when a caller does not pick one
    #[serde(default)]
    pub default_format: OutputFormat,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Json,
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
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("health-sql").join("config.toml")),
            Some(PathBuf::from("/etc/health-sql/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(data_dir) = var("HEALTH_SQL_DATA_DIR") {
            self.storage.data_dir = Some(data_dir);
        }
        if let Some(prefix) = var("HEALTH_SQL_FILE_PREFIX") {
            self.storage.file_prefix = prefix;
        }
        if let Some(size) = var("HEALTH_SQL_CACHE_SIZE") {
            match size.parse() {
                Ok(n) => self.storage.cache_size = n,
                Err(_) => tracing::warn!("Ignoring invalid HEALTH_SQL_CACHE_SIZE={}", size),
            }
        }
        if let Some(enabled) = var("HEALTH_SQL_CACHE_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.storage.cache_enabled = true,
                "0" | "false" | "no" | "off" => self.storage.cache_enabled = false,
                _ => tracing::warn!("Ignoring invalid HEALTH_SQL_CACHE_ENABLED={}", enabled),
            }
        }
        if let Some(offset) = var("HEALTH_SQL_UTC_OFFSET") {
            self.storage.utc_offset = offset;
        }

        // Logging overrides
        if let Some(level) = var("HEALTH_SQL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("HEALTH_SQL_LOG_FORMAT") {
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

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Health SQL Configuration
#
# Environment variables override these settings:
# - HEALTH_SQL_DATA_DIR
# - HEALTH_SQL_FILE_PREFIX
# - HEALTH_SQL_CACHE_SIZE
# - HEALTH_SQL_CACHE_ENABLED
# - HEALTH_SQL_UTC_OFFSET
# - HEALTH_SQL_LOG_LEVEL
# - HEALTH_SQL_LOG_FORMAT

[storage]
# Directory holding the exports (default: current working directory)
# data_dir = "~/Documents/HealthExports"

# Export filename prefix: <prefix>-YYYY-MM-DD.<ext> or <prefix>YYYYMMDD.<ext>
file_prefix = "HealthMetrics"
file_extension = "csv"

# Maximum number of parsed files kept in memory
cache_size = 50
cache_enabled = true

# Zone of the wall-clock timestamps in the exports: local, utc, or +HH:MM
utc_offset = "local"

# Drop records stamped between 01:00 and 01:59 local time
exclude_hour_one = true

[query]
# Output format when none is given: json, csv or summary
default_format = "json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
