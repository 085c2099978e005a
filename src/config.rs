//! Application configuration
//!
//! Loaded from a JSON file, every field optional, then overridden from
//! `BOOKSTORE_*` environment variables and validated. A config path that
//! does not exist yields the defaults.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_server::ServerConfig;
use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    Env { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Logging section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum severity: debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append logs to this file instead of stdout
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn severity(&self) -> ConfigResult<Severity> {
        Severity::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level: {:?}", self.level)))
    }
}

/// Storage section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the backup tier
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Capacity of each replication lane
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_backup_dir() -> String {
    "./data/books".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Whole application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub is_production: bool,
}

impl AppConfig {
    /// Load from `path`, apply the process environment, then validate
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse `path`, or the defaults when it does not exist
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Override fields from `BOOKSTORE_*` variables resolved by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BOOKSTORE_SERVER_HOST") {
            self.server.host = v;
        }
        override_parsed(&lookup, "BOOKSTORE_SERVER_PORT", &mut self.server.port)?;
        override_parsed(
            &lookup,
            "BOOKSTORE_SERVER_REQUEST_TIMEOUT_SECS",
            &mut self.server.request_timeout_secs,
        )?;
        override_parsed(
            &lookup,
            "BOOKSTORE_SERVER_LONG_REQUEST_TIMEOUT_SECS",
            &mut self.server.long_request_timeout_secs,
        )?;
        override_parsed(
            &lookup,
            "BOOKSTORE_SERVER_SHUTDOWN_TIMEOUT_SECS",
            &mut self.server.shutdown_timeout_secs,
        )?;
        if let Some(v) = lookup("BOOKSTORE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("BOOKSTORE_LOG_FILE") {
            self.logging.file = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("BOOKSTORE_BACKUP_DIR") {
            self.storage.backup_dir = v;
        }
        override_parsed(
            &lookup,
            "BOOKSTORE_QUEUE_CAPACITY",
            &mut self.storage.queue_capacity,
        )?;
        override_parsed(&lookup, "BOOKSTORE_IS_PRODUCTION", &mut self.is_production)?;
        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        let server = &self.server;
        if server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        if server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be > 0".into()));
        }
        if server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_secs must be > 0".into(),
            ));
        }
        if server.long_request_timeout_secs < server.request_timeout_secs {
            return Err(ConfigError::Invalid(
                "server.long_request_timeout_secs must be >= server.request_timeout_secs".into(),
            ));
        }
        if server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.shutdown_timeout_secs must be > 0".into(),
            ));
        }
        if server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_body_bytes must be > 0".into()));
        }
        self.logging.severity()?;
        if self.storage.backup_dir.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.backup_dir must not be empty".into(),
            ));
        }
        if self.storage.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "storage.queue_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *slot = value.trim().parse().map_err(|_| ConfigError::Env {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.socket_addr(), "0.0.0.0:8080");
        assert_eq!(config.logging.level, "info");
        assert!(!config.is_production);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::from_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookstore.json");
        fs::write(&path, r#"{"server": {"port": 9090}, "is_production": true}"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.is_production);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_malformed_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookstore.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("BOOKSTORE_SERVER_PORT", "7070"),
                ("BOOKSTORE_LOG_LEVEL", "debug"),
                ("BOOKSTORE_BACKUP_DIR", "/var/lib/books"),
                ("BOOKSTORE_IS_PRODUCTION", "true"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.logging.severity().unwrap(), Severity::Debug);
        assert_eq!(config.storage.backup_dir, "/var/lib/books");
        assert!(config.is_production);
    }

    #[test]
    fn test_unparsable_env_value_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("BOOKSTORE_QUEUE_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("BOOKSTORE_QUEUE_CAPACITY"));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.server.long_request_timeout_secs = 5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.storage.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.host = " ".into();
        assert!(config.validate().is_err());
    }
}
